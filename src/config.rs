//! A generic mechanism for storing request-scoped configuration values.
//!
//! Realizes the "dynamic cast / type-keyed tags" design note: a stable
//! type-id (the Rust type itself, via `TypeId` inside `http::Extensions`)
//! keys an opaque value. `RequestConfig<T>` associates a marker key type
//! with the value type it carries, so a [`Request`](crate::Request) can hold
//! many distinct config knobs — and many distinct user tags of arbitrary
//! type — in one `Extensions` map without collisions.

use http::Extensions;

/// Associates a marker key type with the value type stored for it.
pub(crate) trait RequestConfigValue: Clone + 'static {
    type Value: Clone + Send + Sync + 'static;
}

/// Typed wrapper holding an optional configuration value for marker key `T`.
#[derive(Clone, Copy)]
pub(crate) struct RequestConfig<T: RequestConfigValue>(Option<T::Value>);

impl<T: RequestConfigValue> Default for RequestConfig<T> {
    fn default() -> Self {
        RequestConfig(None)
    }
}

impl<T> RequestConfig<T>
where
    T: RequestConfigValue,
{
    pub(crate) const fn new(v: Option<T::Value>) -> Self {
        RequestConfig(v)
    }

    pub(crate) const fn as_ref(&self) -> Option<&T::Value> {
        self.0.as_ref()
    }

    /// Prefer the request-scoped value; fall back to the client-scoped one.
    pub(crate) fn fetch<'a>(&'a self, ext: &'a Extensions) -> Option<&'a T::Value> {
        ext.get::<RequestConfig<T>>()
            .and_then(Self::as_ref)
            .or(self.as_ref())
    }

    pub(crate) fn get(ext: &Extensions) -> Option<&T::Value> {
        ext.get::<RequestConfig<T>>()?.0.as_ref()
    }

    pub(crate) fn get_mut(ext: &mut Extensions) -> &mut Option<T::Value> {
        &mut ext.get_or_insert_with(RequestConfig::default).0
    }

    pub(crate) fn remove(ext: &mut Extensions) -> Option<T::Value> {
        ext.remove::<RequestConfig<T>>()?.0
    }
}

macro_rules! impl_request_config_value {
    ($type:ty) => {
        impl crate::config::RequestConfigValue for $type {
            type Value = Self;
        }
    };
    ($type:ty, $value:ty) => {
        impl crate::config::RequestConfigValue for $type {
            type Value = $value;
        }
    };
}

/// Marker key: per-call full-call timeout override (spec §5: deadline
/// narrowing via a single `proceed`).
#[derive(Clone, Copy)]
pub(crate) struct RequestTimeout;
impl_request_config_value!(RequestTimeout, std::time::Duration);

/// Marker key: per-request cache-URL override (spec §3 Request fields).
#[derive(Clone)]
pub(crate) struct RequestCacheUrlOverride;
impl_request_config_value!(RequestCacheUrlOverride, url::Url);

/// Marker key: whether a non-`GET` request opts into caching (spec §4.6
/// write path, "a request may opt in its own URL override").
#[derive(Clone, Copy)]
pub(crate) struct RequestCacheableOverride;
impl_request_config_value!(RequestCacheableOverride, bool);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_scoped_value_wins_over_client_scoped() {
        let client_cfg = RequestConfig::<RequestTimeout>::new(Some(std::time::Duration::from_secs(1)));
        let mut ext = Extensions::new();
        *RequestConfig::<RequestTimeout>::get_mut(&mut ext) = Some(std::time::Duration::from_secs(5));

        let got = client_cfg.fetch(&ext).copied();
        assert_eq!(got, Some(std::time::Duration::from_secs(5)));
    }

    #[test]
    fn falls_back_to_client_scoped_when_absent() {
        let client_cfg = RequestConfig::<RequestTimeout>::new(Some(std::time::Duration::from_secs(2)));
        let ext = Extensions::new();
        assert_eq!(client_cfg.fetch(&ext).copied(), Some(std::time::Duration::from_secs(2)));
    }
}
