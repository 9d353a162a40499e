// Source fixtures for role-marked types

pub const HELLO_CONTROLLER: &str = r#"
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Echo endpoints under /hello.
#[rest_controller]
#[request_mapping("/hello")]
pub struct HelloController;

impl HelloController {
    #[get_mapping]
    pub fn hello(&self) -> HashMap<String, String> {
        HashMap::from([("message".to_string(), "Hello from Rust!".to_string())])
    }

    #[post_mapping]
    pub fn post_hello(&self, payload: Map<String, Value>) -> Map<String, Value> {
        payload
    }

    #[put_mapping("/{id}")]
    pub fn put_hello(&self, id: String, payload: Map<String, Value>) -> Map<String, Value> {
        let _ = id;
        payload
    }
}
"#;

pub const TYPE_KINDS: &str = r#"
#[service]
pub struct Pricing {
    rate: u32,
}

#[component]
pub(crate) enum Channel {
    Email,
    Sms,
}

#[repository]
pub trait OrderRepository {
    fn find(&self, id: u64) -> Option<Order>;

    fn count(&self) -> usize {
        0
    }
}

pub struct Order;
"#;

pub const INLINE_MODULES: &str = r#"
mod api {
    #[service]
    pub struct Gateway;

    pub mod v2 {
        #[component]
        pub struct Router;
    }
}

fn build() {
    #[service]
    struct LocalOnly;
}

#[cfg(test)]
mod tests {
    #[service]
    struct FakeGateway;

    impl FakeGateway {
        fn stub(&self) {}
    }
}
"#;

pub const IMPL_FORMS: &str = r#"
use std::fmt;

pub struct Cache<T> {
    items: Vec<T>,
}

impl<T: Clone> Cache<T> {
    pub fn get(&self, index: usize) -> Option<T> {
        self.items.get(index).cloned()
    }

    fn boxed(self: Box<Self>, mut limit: u8) {
        let _ = limit;
    }
}

impl fmt::Display for Cache<String> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cache")
    }
}

impl<'a> From<&'a str> for &'a Cache<String> {
    fn from(_: &'a str) -> Self {
        unimplemented!()
    }
}

impl crate::model::Order {
    pub fn total(&self) -> u64 {
        0
    }
}
"#;

pub const ATTRIBUTE_FORMS: &str = r#"
#[stereotype::service]
pub struct Qualified;

#[controller(path = "/hello")]
pub struct WithArguments;

#[component]
/// Interleaved documentation
// and a plain comment
#[derive(Debug,
         Clone)]
pub struct Commented;

#[repository]
pub struct Detached;

pub struct Unmarked;
"#;

pub const IMPORT_FORMS: &str = r#"
use crate::model::Order;
use serde_json::{Map, Value as Json};
use super::store::{self, OrderStore};
use std::io::*;
use std::fmt as formatting;
use tracing::Instrument as _;

mod api {
    use crate::web::Response;
}

fn local() {
    use std::collections::BTreeMap;
}
"#;
