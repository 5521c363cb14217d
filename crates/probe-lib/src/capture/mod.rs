//! Profile capture pipeline
//!
//! A capture request is validated, assigned a request key and fanned out
//! into one task per configured sample kind. Each task fetches a raw dump
//! (through the cluster's pod proxy or directly from an address), renders
//! it and stores the results under the request key.

mod fetch;
mod key;
mod service;


pub use fetch::{
    address_url, capture_params, fetch_timeout, pod_proxy_path, FetchParams, FetchTarget,
    HttpFetcher, ProfileFetcher, DEFAULT_FETCH_TIMEOUT,
};
pub use key::{parse_listing_entry, RequestKey};
pub use service::{ProfileService, ProfileServiceBuilder};
