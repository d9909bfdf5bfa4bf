use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::conversation::ConversationId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub conversation_id: ConversationId,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantResponse {
    pub text: String,
    pub structured_context: Map<String, Value>,
    pub recommendations: Vec<String>,
}

impl AssistantResponse {
    /// True when the pipeline degraded to an error template.
    pub fn is_error(&self) -> bool {
        matches!(self.structured_context.get("error"), Some(Value::Bool(true)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map};

    use super::{AssistantResponse, ChatRequest};

    #[test]
    fn request_uses_camel_case_wire_shape() {
        let request: ChatRequest =
            serde_json::from_value(json!({ "conversationId": 7, "message": "hola" }))
                .expect("request should deserialize");
        assert_eq!(request.conversation_id.0, 7);
        assert_eq!(request.message, "hola");
    }

    #[test]
    fn error_flag_is_read_from_structured_context() {
        let mut context = Map::new();
        context.insert("error".to_string(), json!(true));
        let response = AssistantResponse {
            text: "x".to_string(),
            structured_context: context,
            recommendations: Vec::new(),
        };

        assert!(response.is_error());
        let json = serde_json::to_value(&response).expect("serialize response");
        assert_eq!(json["structuredContext"]["error"], true);
        assert!(!AssistantResponse::default().is_error());
    }
}
