//! EventSchema trait - typed event bodies bound to a queue.
//!
//! A schema is a plain serde struct. Decoding the raw payload into it is the
//! structural/type check; `validate` adds semantic checks on top.
//!
//! # 学習ポイント
//! - Associated Constants (`const QUEUE`)
//! - Trait bounds の組み合わせ (Serialize + DeserializeOwned + Send + Sync + 'static)

use serde::Serialize;
use serde::de::DeserializeOwned;

/// EventSchema binds a body type to the queue it is published on.
///
/// # Example
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct UserCreated {
///     user_id: i64,
///     user_name: String,
/// }
///
/// impl EventSchema for UserCreated {
///     const QUEUE: &'static str = "user_events";
/// }
/// ```
///
/// Unknown payload fields are dropped on re-encoding unless the struct opts
/// into `#[serde(deny_unknown_fields)]`, in which case they reject the record.
pub trait EventSchema: Serialize + DeserializeOwned + Send + Sync + 'static {
    const QUEUE: &'static str;

    /// Semantic validation after a successful decode.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}
