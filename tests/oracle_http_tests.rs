//! OpenAI-compatible oracle against a mock HTTP server.

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use conductor::error::ConductorError;
use conductor::oracle::{
    delegate_tool_definition, parse_decision, AgentDecision, DecisionContext, DecisionOracle,
    DecisionRequest, OpenAiOracle,
};
use conductor::types::ModelMessage;

fn completion(message: serde_json::Value, finish_reason: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [{ "index": 0, "message": message, "finish_reason": finish_reason }]
    })
}

fn request() -> DecisionRequest {
    DecisionRequest::builder()
        .instructions("You are the intake agent.")
        .messages(vec![ModelMessage::user("plan my loan")])
        .tools(vec![delegate_tool_definition(&["review".to_string()])])
        .build()
}

#[tokio::test]
async fn tool_call_reply_becomes_delegation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-test",
            "parallel_tool_calls": false,
            "messages": [{ "role": "system", "content": "You are the intake agent." }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            json!({
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {
                        "name": "delegate",
                        "arguments": "{\"agent_name\":\"review\",\"reason\":\"needs approval\"}"
                    }
                }]
            }),
            "tool_calls",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let oracle = OpenAiOracle::new(server.uri(), Some("sk-test".into()), "gpt-test");
    let reply = oracle.decide(&request()).await.unwrap();
    assert_eq!(reply.tool_calls.len(), 1);
    assert_eq!(reply.finish_reason.as_deref(), Some("tool_calls"));

    let delegates = vec!["review".to_string()];
    let ctx = DecisionContext {
        agent: "intake",
        delegates: &delegates,
    };
    assert_eq!(
        parse_decision(&reply, ctx).unwrap(),
        AgentDecision::Delegate {
            target: "review".into(),
            reason: "needs approval".into()
        }
    );
}

#[tokio::test]
async fn text_reply_becomes_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(
            json!({ "role": "assistant", "content": "Your plan is ready." }),
            "stop",
        )))
        .mount(&server)
        .await;

    let oracle = OpenAiOracle::new(server.uri(), None, "gpt-test");
    let reply = oracle.decide(&request()).await.unwrap();
    let ctx = DecisionContext {
        agent: "intake",
        delegates: &[],
    };
    assert_eq!(
        parse_decision(&reply, ctx).unwrap(),
        AgentDecision::Respond("Your plan is ready.".into())
    );
}

#[tokio::test]
async fn server_errors_are_retryable_and_auth_errors_are_not() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let oracle = OpenAiOracle::new(server.uri(), Some("sk-bad".into()), "gpt-test");
    let first = oracle.decide(&request()).await.unwrap_err();
    assert!(matches!(first, ConductorError::Api { status: 503, .. }));
    assert!(first.is_retryable());

    let second = oracle.decide(&request()).await.unwrap_err();
    assert!(matches!(second, ConductorError::Authentication(_)));
    assert!(!second.is_retryable());
}

#[tokio::test]
async fn empty_choices_is_a_parse_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
        .mount(&server)
        .await;

    let oracle = OpenAiOracle::new(server.uri(), None, "gpt-test");
    let err = oracle.decide(&request()).await.unwrap_err();
    assert!(matches!(err, ConductorError::DecisionParse(_)));
}
