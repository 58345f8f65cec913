use std::sync::RwLock;

/// The bearer credential used for every replayed request.
///
/// Last write wins. Empty values and the literal `"undefined"` (what a
/// stringified missing header looks like) never overwrite a held value.
#[derive(Debug, Default)]
pub struct AuthCredential {
    value: RwLock<Option<String>>,
}

impl AuthCredential {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the value was taken
    pub fn update_from_header(&self, header: Option<&str>) -> bool {
        let Some(value) = header.map(str::trim) else {
            log::debug!("No auth header passed, leaving existing value");
            return false;
        };
        if value.is_empty() || value == "undefined" {
            log::debug!("Auth header='{}' is not usable, leaving existing value", value);
            return false;
        }
        match self.value.write() {
            Ok(mut guard) => {
                *guard = Some(value.to_string());
                true
            }
            Err(e) => {
                log::error!("Credential lock poisoned: {}", e);
                false
            }
        }
    }

    pub fn current(&self) -> Option<String> {
        self.value.read().ok().and_then(|guard| guard.clone())
    }

    pub fn is_set(&self) -> bool {
        self.current().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let credential = AuthCredential::new();
        assert!(!credential.is_set());

        assert!(credential.update_from_header(Some("Bearer one")));
        assert!(credential.update_from_header(Some("Bearer two")));
        assert_eq!(credential.current().as_deref(), Some("Bearer two"));
    }

    #[test]
    fn test_stale_values_are_ignored() {
        let credential = AuthCredential::new();
        credential.update_from_header(Some("Bearer one"));

        assert!(!credential.update_from_header(None));
        assert!(!credential.update_from_header(Some("")));
        assert!(!credential.update_from_header(Some("undefined")));
        assert_eq!(credential.current().as_deref(), Some("Bearer one"));
    }
}
