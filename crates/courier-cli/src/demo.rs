use courier_core::domain::Payload;
use courier_core::impls::InMemoryOutboxStore;
use courier_core::typed::EventSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize, Deserialize)]
pub struct UserCreated {
    pub user_id: i64,
    pub user_name: String,
}

impl EventSchema for UserCreated {
    const QUEUE: &'static str = "user_events";

    fn validate(&self) -> Result<(), String> {
        if self.user_name.trim().is_empty() {
            return Err("user_name must not be blank".to_string());
        }
        Ok(())
    }
}

fn payload(value: serde_json::Value) -> Payload {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Payload::new(),
    }
}

/// What a business transaction would have written: one good event, one the
/// schema rejects, one for a queue nobody handles.
pub fn seed(store: &InMemoryOutboxStore) {
    store.insert(
        UserCreated::QUEUE,
        payload(json!({ "user_id": 42, "user_name": "Neo" })),
    );
    store.insert(
        UserCreated::QUEUE,
        payload(json!({ "user_id": "forty-two" })),
    );
    store.insert("audit_events", payload(json!({ "action": "login" })));
}
