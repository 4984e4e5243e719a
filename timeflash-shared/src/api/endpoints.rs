use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::port_scope;

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

pub(crate) fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

pub fn healthz(base: &str) -> String {
    base_join(base, "/healthz")
}

pub fn port(base: &str, name: &str) -> String {
    base_join(base, &port_scope(name))
}
