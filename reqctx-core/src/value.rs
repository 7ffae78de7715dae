use std::any::Any;
use std::sync::Arc;

/// Opaque value attached to a request slot
///
/// Any `Send + Sync + 'static` type can be stored. Cloning is cheap (the
/// payload lives behind an `Arc`), which is what lets `get_all` hand out
/// snapshots without copying the payloads themselves.
///
/// The default value is *nil*: it is what [`Store::get`](crate::Store::get)
/// returns when nothing is stored, and it can also be stored explicitly.
#[derive(Clone, Default)]
pub struct Value {
    inner: Option<Arc<dyn Any + Send + Sync>>,
}

impl Value {
    /// Wraps any value
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Some(Arc::new(value)),
        }
    }

    /// The empty value
    pub fn nil() -> Self {
        Self::default()
    }

    /// Returns `true` for the empty value
    pub fn is_nil(&self) -> bool {
        self.inner.is_none()
    }

    /// Borrows the payload if it is a `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.as_deref()?.downcast_ref()
    }

    /// Returns a shared reference to the payload if it is a `T` (zero-cost clone)
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(self.inner.as_ref()?).downcast().ok()
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_nil() {
            f.write_str("Value(nil)")
        } else {
            f.write_str("Value(..)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct AuthInfo {
        user: String,
    }

    #[test]
    fn test_default_is_nil() {
        let value = Value::default();
        assert!(value.is_nil());
        assert!(value.downcast_ref::<String>().is_none());
        assert_eq!(format!("{:?}", value), "Value(nil)");
    }

    #[test]
    fn test_downcast_ref_matching_type() {
        let value = Value::new(AuthInfo {
            user: "alice".to_string(),
        });

        assert!(!value.is_nil());
        assert_eq!(value.downcast_ref::<AuthInfo>().map(|a| a.user.as_str()), Some("alice"));
    }

    #[test]
    fn test_downcast_ref_wrong_type() {
        let value = Value::new(42u32);
        assert!(value.downcast_ref::<i64>().is_none());
        assert_eq!(value.downcast_ref::<u32>(), Some(&42));
    }

    #[test]
    fn test_downcast_returns_shared_arc() {
        let value = Value::new("shared".to_string());

        let a = value.downcast::<String>().unwrap();
        let b = value.downcast::<String>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.as_str(), "shared");
        assert!(value.downcast::<u8>().is_none());
    }

    #[test]
    fn test_clone_shares_payload() {
        let value = Value::new(vec![1, 2, 3]);
        let copy = value.clone();

        let a = value.downcast::<Vec<i32>>().unwrap();
        let b = copy.downcast::<Vec<i32>>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!copy.is_nil());
    }
}
