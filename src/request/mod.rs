//! HTTP request representation.
use std::collections::HashMap;
use std::fmt;
use std::hash;

pub mod parser;

/// An HTTP Request. `T` is the parsed payload type; the pipeline starts
/// out with `T = Vec<u8>` and middleware may transform it en route to the
/// handler.
#[derive(Debug, Clone, PartialEq)]
pub struct Request<T> {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub fragment: String,
    pub headers: HashMap<Header, String>,
    pub payload: Option<T>,
    pub content_length: usize,
    pub params: Params,
}

pub type RawRequest = Request<Vec<u8>>;

impl<T> Default for Request<T> {
    fn default() -> Self {
        Self {
            method: Method::GET,
            path: "/".to_string(),
            query: "".to_string(),
            fragment: "".to_string(),
            headers: vec![("Host".to_string().into(), "localhost".to_string())]
                .into_iter()
                .collect(),
            payload: None,
            content_length: 0,
            params: Params::new(),
        }
    }
}

impl<T> Request<T> {
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(Header::new(name), value.to_string());
        self
    }
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&Header::new(name)).map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GET,
    HEAD,
    POST,
    PUT,
    PATCH,
    DELETE,
    CONNECT,
    OPTIONS,
    TRACE,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GET => "GET",
            Self::HEAD => "HEAD",
            Self::POST => "POST",
            Self::PUT => "PUT",
            Self::PATCH => "PATCH",
            Self::DELETE => "DELETE",
            Self::CONNECT => "CONNECT",
            Self::OPTIONS => "OPTIONS",
            Self::TRACE => "TRACE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Param {
    Path(String),
    Query(String),
    Body(String),
}

impl ToString for Param {
    fn to_string(&self) -> String {
        match self {
            Self::Path(s) => s.clone(),
            Self::Query(s) => s.clone(),
            Self::Body(s) => s.clone(),
        }
    }
}

/// Case-insensitive header name wrapper.
#[derive(Debug, Clone)]
pub struct Header(String);

impl Header {
    pub fn new(s: &str) -> Self {
        Self(s.to_string())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Header {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for Header {}

impl hash::Hash for Header {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.0.to_lowercase().hash(state);
    }
}

impl From<String> for Header {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<Header> for String {
    fn from(s: Header) -> Self {
        s.0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(HashMap<Param, Vec<String>>);

impl Params {
    pub fn new() -> Self {
        Params(HashMap::new())
    }
    pub fn add(&mut self, p: Param, s: String) {
        self.0.entry(p).or_insert_with(Vec::new).push(s);
    }
    /// Merge another `Params` into this one, e.g. the route params a
    /// router extracts from the path once a match is found.
    pub fn extend(&mut self, other: Params) {
        for (p, vals) in other.0 {
            for v in vals {
                self.add(p.clone(), v);
            }
        }
    }
    pub fn get_all(&self, p: &Param) -> Option<&Vec<String>> {
        self.0.get(p)
    }
    pub fn get_first(&self, p: &Param) -> Option<&String> {
        match self.0.get(p).map(|v| &v[..]) {
            None => None,
            Some([]) => None,
            Some(ps) => Some(&ps[0]),
        }
    }
    /// Get named param from anywhere: path, then query, then body.
    pub fn get_any(&self, name: &str) -> Option<&String> {
        let try_params = [
            Param::Path(name.to_string()),
            Param::Query(name.to_string()),
            Param::Body(name.to_string()),
        ];
        for p in try_params.iter() {
            if let Some(val) = self.get_first(p) {
                return Some(val);
            }
        }
        None
    }
}
