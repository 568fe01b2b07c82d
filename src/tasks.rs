//! Built-in operations
//!
//! Handlers shipped with the crate. Register them on a [`WorkerRegistry`]
//! with [`register_builtin`].

use serde_json::{Value, json};

use crate::error::{DispatchError, Result};
use crate::processing::WorkerRegistry;

pub const ADD_TOGETHER: &str = "add_together";

/// Sum of two JSON numbers, as a float
///
/// A sum that is not finite is reported as an overflow.
///
/// ```rust
/// use qdispatch::tasks::add_together;
/// use serde_json::json;
///
/// assert_eq!(add_together(&[json!(2), json!(3)]).unwrap(), json!(5.0));
/// assert!(add_together(&[json!(f64::MAX), json!(f64::MAX)]).is_err());
/// ```
pub fn add_together(args: &[Value]) -> Result<Value> {
    let (a, b) = match args {
        [a, b] => (number(a, "a")?, number(b, "b")?),
        _ => {
            return Err(DispatchError::invalid_argument(format!(
                "add_together takes 2 arguments, got {}",
                args.len()
            )));
        }
    };

    let sum = a + b;
    if !sum.is_finite() {
        return Err(DispatchError::worker(format!(
            "overflow adding {} and {}",
            a, b
        )));
    }

    Ok(json!(sum))
}

fn number(value: &Value, name: &str) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| DispatchError::invalid_argument(format!("{} must be a number", name)))
}

/// Register every built-in operation
pub fn register_builtin(registry: &mut WorkerRegistry) {
    registry.register_fn(ADD_TOGETHER, add_together);
}
