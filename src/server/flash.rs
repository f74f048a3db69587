//! One-shot messages carried across a redirect in a signed cookie.

use axum_extra::extract::cookie::{Cookie, SignedCookieJar};

const FLASH_COOKIE: &str = "_flashes";

fn decode(raw: &str) -> Vec<String> {
    hex::decode(raw)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .unwrap_or_default()
}

fn encode(messages: &[String]) -> String {
    // hex keeps quotes, spaces and semicolons out of the cookie value.
    hex::encode(serde_json::to_vec(messages).unwrap_or_default())
}

/// Appends a message to the pending flashes.
pub fn push(jar: SignedCookieJar, message: impl Into<String>) -> SignedCookieJar {
    let mut messages = jar
        .get(FLASH_COOKIE)
        .map(|c| decode(c.value()))
        .unwrap_or_default();
    messages.push(message.into());

    let cookie = Cookie::build((FLASH_COOKIE, encode(&messages)))
        .path("/")
        .http_only(true)
        .build();
    jar.add(cookie)
}

/// Removes and returns every pending flash.
pub fn take(jar: SignedCookieJar) -> (SignedCookieJar, Vec<String>) {
    let Some(cookie) = jar.get(FLASH_COOKIE) else {
        return (jar, Vec::new());
    };
    let messages = decode(cookie.value());
    let jar = jar.remove(Cookie::build(FLASH_COOKIE).path("/").build());
    (jar, messages)
}
