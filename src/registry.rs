use crate::matcher::UrlMatcher;
use crate::stub::{Options, Stub};
use crate::transport::RequestBody;
use rand::distr::Alphanumeric;
use rand::Rng;

///
/// Registered stubs, in registration order. The order is the match priority: the first
/// registered stub matching a request wins.
///
#[derive(Debug, Default)]
pub(crate) struct Registry {
    stubs: Vec<Stub>,
}

impl Registry {
    pub(crate) fn create(
        &mut self,
        method: &str,
        url: UrlMatcher,
        expected: bool,
        options: Options,
    ) -> &Stub {
        let id = rand::rng()
            .sample_iter(&Alphanumeric)
            .map(char::from)
            .take(24)
            .collect();

        self.stubs
            .push(Stub::new(id, method, url, expected, options));

        &self.stubs[self.stubs.len() - 1]
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Stub> {
        self.stubs.iter().find(|stub| stub.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Stub> {
        self.stubs.iter_mut().find(|stub| stub.id == id)
    }

    ///
    /// Finds the first stub matching the request. Expectations are consumed by the match.
    ///
    pub(crate) fn match_request(
        &mut self,
        method: &str,
        url: &str,
        body: Option<&RequestBody>,
        headers: &[(String, String)],
    ) -> Option<Stub> {
        let position = self
            .stubs
            .iter()
            .position(|stub| stub.matches(method, url, body, headers))?;

        if self.stubs[position].expected {
            Some(self.stubs.remove(position))
        } else {
            Some(self.stubs[position].clone())
        }
    }

    pub(crate) fn outstanding_expected(&self) -> Vec<Stub> {
        self.stubs
            .iter()
            .filter(|stub| stub.expected)
            .cloned()
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.stubs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_background_stubs_match_repeatedly() {
        let mut registry = Registry::default();
        registry.create("GET", "/user".into(), false, Options::default());

        assert!(registry.match_request("GET", "/user", None, &[]).is_some());
        assert!(registry.match_request("GET", "/user", None, &[]).is_some());
        assert!(registry.outstanding_expected().is_empty());
    }

    #[test]
    fn test_expectations_are_consumed_once() {
        let mut registry = Registry::default();
        let id = registry
            .create("GET", "/user".into(), true, Options::default())
            .id
            .clone();

        assert_eq!(1, registry.outstanding_expected().len());

        let matched = registry.match_request("GET", "/user", None, &[]).unwrap();
        assert_eq!(id, matched.id);
        assert!(registry.outstanding_expected().is_empty());
        assert!(registry.get(&id).is_none());
        assert!(registry.match_request("GET", "/user", None, &[]).is_none());
    }

    #[test]
    fn test_consumed_expectation_falls_through_to_the_next_stub() {
        let mut registry = Registry::default();
        let expectation = registry
            .create("GET", "/user".into(), true, Options::default())
            .id
            .clone();
        let background = registry
            .create("GET", "/user".into(), false, Options::default())
            .id
            .clone();

        let first = registry.match_request("GET", "/user", None, &[]).unwrap();
        let second = registry.match_request("GET", "/user", None, &[]).unwrap();

        assert_eq!(expectation, first.id);
        assert_eq!(background, second.id);
    }

    #[test]
    fn test_first_registered_wins() {
        let mut registry = Registry::default();
        let specific = registry
            .create("GET", "fixtures/data.json".into(), false, Options::default())
            .id
            .clone();
        registry.create("GET", "fixtures/*".into(), false, Options::default());

        let matched = registry
            .match_request("GET", "fixtures/data.json", None, &[])
            .unwrap();
        assert_eq!(specific, matched.id);
    }

    #[test]
    fn test_outstanding_expected_keeps_registration_order() {
        let mut registry = Registry::default();
        registry.create("GET", "/a".into(), true, Options::default());
        registry.create("GET", "/b".into(), false, Options::default());
        registry.create("POST", "/c".into(), true, Options::default());

        let outstanding: Vec<String> = registry
            .outstanding_expected()
            .iter()
            .map(|stub| stub.to_string())
            .collect();

        assert_eq!(
            vec!["(expecting) GET /a", "(expecting) POST /c"],
            outstanding
        );
    }

    #[test]
    fn test_body_mismatch_does_not_consume() {
        let mut registry = Registry::default();
        let id = registry
            .create("POST", "api/theanswer".into(), true, Options::default())
            .id
            .clone();
        registry.get_mut(&id).unwrap().body = Some(json!({"yes": true}).into());

        let wrong = RequestBody::from(json!({"yes": false}));
        assert!(registry
            .match_request("POST", "api/theanswer", Some(&wrong), &[])
            .is_none());
        assert_eq!(1, registry.outstanding_expected().len());
    }

    #[test]
    fn test_clear() {
        let mut registry = Registry::default();
        registry.create("GET", "/a".into(), true, Options::default());
        registry.clear();

        assert!(registry.outstanding_expected().is_empty());
        assert!(registry.match_request("GET", "/a", None, &[]).is_none());
    }
}
