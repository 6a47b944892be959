use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lazy_static::lazy_static;
use log::*;
use rusqlite::{params, Connection};
use structopt::StructOpt;

use midware::prelude::*;
use midware::request::RawRequest;

// midware uses the log crate for logging; TcpHttpListener logs accepted
// connections at DEBUG and parsed requests at TRACE. Just a basic stderr
// setup for demonstration.
fn setup_logging(verbosity: usize) {
    stderrlog::new()
        .module(module_path!())
        .module("midware")
        .verbosity(verbosity)
        .timestamp(stderrlog::Timestamp::Millisecond)
        .init()
        .unwrap();
}

fn main() {
    let opt = Opt::from_args();
    setup_logging(opt.verbose);
    setup_db();

    let bind = format!("0.0.0.0:{}", opt.port);
    let listener = TcpHttpListener::bind(
        &bind,
        opt.threads,
        Some(Duration::from_secs(30)),
    )
    .unwrap();

    let router = PathRouter::new().with_route("/person/?id", PersonApi.controller());

    // Middleware runs outside-in on the way in, inside-out on the way out:
    // RequestId sees every request/response; RequireAuth only runs once a
    // route has matched, since it is a view-phase hook.
    let middlewares: Vec<Box<dyn Middleware<Context>>> = vec![
        Box::new(RequestId),
        Box::new(require_auth(authenticate)),
    ];

    let handle = midware::server::serve(
        "api_service",
        listener,
        router,
        middlewares,
        ServerOptions::default(),
    );
    handle.wait_listening();
    info!("listening on {}", &bind);
    handle.wait_closed();
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
struct Person {
    /// Database ID, should be zero for newly created data.
    #[serde(default)]
    id: i64,
    name: String,
    age: u16,
}

struct PersonApi;

impl PersonApi {
    fn error(&self, code: u16, reason: &str, context: &Context) -> PipelineError {
        PipelineError::handler(code, format!("{} (request {})", reason, context.request_id))
    }
}

// Basic CRUD (well, without the U) REST API for demonstration, built on
// the Api trait's default-405 get/post/put/patch/delete methods.
impl Api<Context> for PersonApi {
    fn get(&self, request: &RawRequest, context: &mut Context) -> PipelineResult {
        let id = match request.params.get_any("id") {
            Some(id) => match str::parse::<i64>(id) {
                Ok(id) => id,
                Err(_) => return Err(self.error(400, "id must be an integer", context)),
            },
            None => return Err(self.error(400, "missing parameter id", context)),
        };
        let conn = CONNECTION.lock().unwrap();
        match Person::select(&conn, id) {
            Some(person) => Ok(Box::new(Json(person)) as Box<dyn IntoResponse + Send>),
            None => Err(self.error(404, "resource not found", context)),
        }
    }

    fn post(&self, request: &RawRequest, context: &mut Context) -> PipelineResult {
        let payload = request
            .payload
            .as_ref()
            .ok_or_else(|| self.error(400, "expected request body", context))?;
        let mut person: Person = serde_json::from_slice(payload)
            .map_err(|_| self.error(400, "invalid request body", context))?;
        if person.id != 0 {
            return Err(self.error(400, "id must be 0", context));
        }
        let conn = CONNECTION.lock().unwrap();
        person.insert(&conn);
        let response = Response::make(Body::Empty, Some(201), vec![])
            .with_header("Location", &format!("/person/{}", person.id));
        Ok(Box::new(response) as Box<dyn IntoResponse + Send>)
    }

    fn delete(&self, request: &RawRequest, context: &mut Context) -> PipelineResult {
        let id = match request.params.get_any("id") {
            Some(id) => match str::parse::<i64>(id) {
                Ok(id) => id,
                Err(_) => return Err(self.error(400, "id must be an integer", context)),
            },
            None => return Err(self.error(400, "missing parameter id", context)),
        };
        let conn = CONNECTION.lock().unwrap();
        match Person::select(&conn, id) {
            Some(mut person) => {
                person.delete(&conn);
                Ok(Box::new(()) as Box<dyn IntoResponse + Send>)
            }
            None => Err(self.error(404, "resource not found", context)),
        }
    }
}

/// API auth username.
#[derive(Debug)]
struct User(String);

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct Context {
    request_id: u64,
    user: Option<User>,
}

impl Default for Context {
    fn default() -> Self {
        Context {
            user: None,
            request_id: REQUEST_COUNTER.fetch_add(1, Ordering::SeqCst),
        }
    }
}

impl Context {
    fn set_user(&mut self, user: User) {
        self.user = Some(user)
    }
}

/// Request-phase middleware stamping every response with the request ID
/// assigned to its context.
struct RequestId;

impl Middleware<Context> for RequestId {
    fn process_request(
        &self,
        request: RawRequest,
        context: &mut Context,
        next: &mut (dyn FnMut(RawRequest, &mut Context) -> PipelineResult + '_),
    ) -> PipelineResult {
        let request_id = context.request_id;
        match next(request, context) {
            Ok(boxed) => {
                let response = boxed
                    .into_response()
                    .with_header("X-Request-Id", &request_id.to_string());
                Ok(Box::new(response) as Box<dyn IntoResponse + Send>)
            }
            Err(err) => Err(err),
        }
    }
}

// API key based "authentication"; obviously a real implementation would
// validate keys against something other than a hardcoded string.
fn authenticate(request: &RawRequest, context: &mut Context) -> Result<(), AuthError> {
    match request.header("x-api-key") {
        Some("secret") => {
            context.set_user(User("admin".to_string()));
            Ok(())
        }
        Some(_) => Err(AuthError::new("invalid API key")),
        None => Err(AuthError::new("missing API key")),
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "api_service", about = "Example REST API service.")]
struct Opt {
    #[structopt(short, long, default_value = "8080")]
    port: u16,
    #[structopt(long, default_value = "1")]
    threads: usize,
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: usize,
}

// Everything beyond this point is just the most terrible, minimal sqlite
// setup to get the example working with no external DB setup.
lazy_static! {
    static ref CONNECTION: Arc<Mutex<Connection>> =
        Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
}

fn setup_db() {
    let conn = CONNECTION.lock().unwrap();
    conn.execute(CREATE_TABLE_PERSON, []).unwrap();
}

const CREATE_TABLE_PERSON: &str = "CREATE TABLE person
(
    id        INTEGER PRIMARY KEY,
    name      TEXT NOT NULL,
    age       INTEGER
)";

impl Person {
    fn insert(&mut self, conn: &Connection) {
        assert_eq!(self.id, 0);
        conn.execute(
            "INSERT INTO person (name, age) VALUES (?1, ?2)",
            params![self.name, self.age],
        )
        .unwrap();
        self.id = conn.last_insert_rowid();
    }
    fn delete(&mut self, conn: &Connection) {
        conn.execute("DELETE FROM person WHERE id=?1", params![self.id])
            .unwrap();
        self.id = 0;
    }
    fn select(conn: &Connection, id: i64) -> Option<Self> {
        let mut stmt = conn
            .prepare("SELECT id, name, age FROM person WHERE id=?1")
            .unwrap();
        let mut person_iter = stmt
            .query_map([id], |row| {
                Ok(Person {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    age: row.get(2)?,
                })
            })
            .ok()?;
        person_iter.next().map(|r| r.unwrap())
    }
}
