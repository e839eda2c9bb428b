//! Per-request identity fields.
//!
//! Whatever sits in front of the handler (an auth layer, a request-id
//! middleware, the [`Server`](crate::Server) context extractor) builds one
//! [`RequestContext`] and attaches it to the request as a typed extension.
//! [`Exchange::capture`](crate::Exchange::capture) picks it up from there; a
//! request without one gets the default, all-empty context.
//!
//! The fields are a closed set. Accessors never fail: an absent field reads
//! as the empty string, and log enrichment skips it.

use http::Extensions;

/// Identity fields carried alongside one request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RequestContext {
    pub request_id: Option<String>,
    pub session_username: Option<String>,
    pub session_token: Option<String>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_session_username(mut self, username: impl Into<String>) -> Self {
        self.session_username = Some(username.into());
        self
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// The request id, or `""` when absent.
    pub fn request_id(&self) -> &str {
        self.request_id.as_deref().unwrap_or("")
    }

    /// The session username, or `""` when absent.
    pub fn session_username(&self) -> &str {
        self.session_username.as_deref().unwrap_or("")
    }

    /// The session token, or `""` when absent.
    pub fn session_token(&self) -> &str {
        self.session_token.as_deref().unwrap_or("")
    }

    /// Attaches this context to a request's extensions.
    pub fn attach(self, extensions: &mut Extensions) {
        extensions.insert(self);
    }

    /// The context attached to `extensions`, or the default when none is.
    pub(crate) fn from_extensions(extensions: &Extensions) -> Self {
        extensions.get::<Self>().cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_read_as_empty() {
        let ctx = RequestContext::new();
        assert_eq!(ctx.request_id(), "");
        assert_eq!(ctx.session_username(), "");
        assert_eq!(ctx.session_token(), "");
    }

    #[test]
    fn builder_sets_fields() {
        let ctx = RequestContext::new()
            .with_request_id("req-1")
            .with_session_username("alice")
            .with_session_token("tok");
        assert_eq!(ctx.request_id(), "req-1");
        assert_eq!(ctx.session_username(), "alice");
        assert_eq!(ctx.session_token(), "tok");
    }

    #[test]
    fn attach_and_recover_through_extensions() {
        let mut ext = Extensions::new();
        RequestContext::new().with_request_id("req-2").attach(&mut ext);
        let ctx = RequestContext::from_extensions(&ext);
        assert_eq!(ctx.request_id(), "req-2");
    }

    #[test]
    fn missing_extension_yields_default() {
        let ext = Extensions::new();
        assert_eq!(RequestContext::from_extensions(&ext), RequestContext::default());
    }
}
