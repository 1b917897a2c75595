//! In-memory stand-in for a vtiger `/webservice.php` endpoint.
//!
//! Serves one user, hands out challenge tokens, verifies
//! `md5(token + access_key)` on login and keeps records per module. Query
//! support covers `SELECT <fields|*> FROM <Module> [WHERE f=v]
//! [ORDER BY f [ASC|DESC]] [LIMIT [o, ]n];`, enough for client tests.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::Arc,
};

use axum::{
    extract::{Form, Query, State},
    routing::get,
    Json, Router,
};
use md5::{Digest, Md5};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_USER: &str = "admin";
pub const DEFAULT_ACCESS_KEY: &str = "accesskey";

const USER_ID: &str = "19x1";

/// Outstanding challenge tokens kept before the oldest is dropped.
const MAX_PENDING_CHALLENGES: usize = 16;

/// Modules the mock knows about: name, id prefix, mandatory fields.
const MODULES: &[(&str, &str, &[&str])] = &[
    ("Leads", "10", &["lastname", "company"]),
    ("Accounts", "11", &["accountname"]),
    ("Contacts", "12", &["lastname"]),
];

/// The single account the mock accepts.
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub user: String,
    pub access_key: String,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            user: DEFAULT_USER.to_string(),
            access_key: DEFAULT_ACCESS_KEY.to_string(),
        }
    }
}

impl MockConfig {
    /// `MOCK_VTIGER_USER` / `MOCK_VTIGER_ACCESS_KEY`, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            user: std::env::var("MOCK_VTIGER_USER").unwrap_or(defaults.user),
            access_key: std::env::var("MOCK_VTIGER_ACCESS_KEY").unwrap_or(defaults.access_key),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub module: String,
    pub fields: Map<String, Value>,
}

impl Record {
    fn to_json(&self) -> Value {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        Value::Object(fields)
    }
}

#[derive(Debug, Default)]
pub struct Store {
    challenges: VecDeque<String>,
    sessions: HashSet<String>,
    records: BTreeMap<u64, Record>,
    next_seq: u64,
}

impl Store {
    fn issue_challenge(&mut self, token: String) {
        if self.challenges.len() == MAX_PENDING_CHALLENGES {
            self.challenges.pop_front();
        }
        self.challenges.push_back(token);
    }

    /// Match `access_key` against the outstanding tokens. A successful
    /// login clears every pending challenge.
    fn redeem_challenge(&mut self, access_key: &str, secret: &str) -> Result<(), Fault> {
        if self.challenges.is_empty() {
            return Err(Fault::new("INVALID_AUTH_TOKEN", "Specified token is invalid or expired"));
        }
        let matched = self
            .challenges
            .iter()
            .any(|token| md5_hex(&format!("{token}{secret}")) == access_key);
        if !matched {
            return Err(Fault::new("INVALID_USER_CREDENTIALS", "Invalid username or password"));
        }
        self.challenges.clear();
        Ok(())
    }
}

#[derive(Debug)]
pub struct AppState {
    config: MockConfig,
    store: RwLock<Store>,
}

pub type Db = Arc<AppState>;

/// A vtiger-style failure: `{"success": false, "error": {code, message}}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: &'static str,
    pub message: String,
}

impl Fault {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

type Reply = Result<Value, Fault>;
type Params = HashMap<String, String>;

pub fn app() -> Router {
    app_with(MockConfig::default())
}

pub fn app_with(config: MockConfig) -> Router {
    let db: Db = Arc::new(AppState {
        config,
        store: RwLock::new(Store::default()),
    });
    Router::new()
        .route("/webservice.php", get(handle_get).post(handle_post))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with(listener, MockConfig::default()).await
}

pub async fn run_with(listener: TcpListener, config: MockConfig) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(config)).await
}

fn envelope(reply: Reply) -> Json<Value> {
    match reply {
        Ok(result) => Json(json!({ "success": true, "result": result })),
        Err(fault) => {
            debug!(code = fault.code, message = %fault.message, "request failed");
            Json(json!({
                "success": false,
                "error": { "code": fault.code, "message": fault.message },
            }))
        }
    }
}

async fn handle_get(State(db): State<Db>, Query(params): Query<Params>) -> Json<Value> {
    let reply = match param(&params, "operation") {
        Ok("getchallenge") => get_challenge(&db, &params).await,
        Ok("listtypes") => list_types(&db, &params).await,
        Ok("describe") => describe(&db, &params).await,
        Ok("retrieve") => retrieve(&db, &params).await,
        Ok("query") => query(&db, &params).await,
        Ok(other) => Err(unknown_operation(other)),
        Err(fault) => Err(fault),
    };
    envelope(reply)
}

async fn handle_post(State(db): State<Db>, Form(params): Form<Params>) -> Json<Value> {
    let reply = match param(&params, "operation") {
        Ok("login") => login(&db, &params).await,
        Ok("create") => create(&db, &params).await,
        Ok("update") => update(&db, &params).await,
        Ok("delete") => delete(&db, &params).await,
        Ok("logout") => logout(&db, &params).await,
        Ok(other) => Err(unknown_operation(other)),
        Err(fault) => Err(fault),
    };
    envelope(reply)
}

fn unknown_operation(name: &str) -> Fault {
    Fault::new("UNKNOWN_OPERATION", format!("Unknown operation requested: {name}"))
}

fn param<'a>(params: &'a Params, name: &str) -> Result<&'a str, Fault> {
    params
        .get(name)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Fault::new("MANDATORY_FIELDS_MISSING", format!("{name} does not have a value")))
}

fn module(name: &str) -> Result<&'static (&'static str, &'static str, &'static [&'static str]), Fault> {
    MODULES
        .iter()
        .find(|(m, _, _)| *m == name)
        .ok_or_else(|| Fault::new("INVALID_MODULE", format!("Permission to perform the operation is denied for name {name}")))
}

fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

async fn require_session(db: &Db, params: &Params) -> Result<(), Fault> {
    let session = params.get("sessionName").map(String::as_str).unwrap_or_default();
    if db.store.read().await.sessions.contains(session) {
        Ok(())
    } else {
        Err(Fault::new("INVALID_SESSIONID", "Session Identifier provided is Invalid"))
    }
}

fn parse_element(params: &Params) -> Result<Map<String, Value>, Fault> {
    let raw = param(params, "element")?;
    match serde_json::from_str(raw) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(Fault::new("INVALID_ELEMENT", "element is not a JSON object")),
    }
}

/// Record ids are `<module prefix>x<sequence>`.
fn parse_id(id: &str) -> Option<(&str, u64)> {
    let (prefix, seq) = id.split_once('x')?;
    Some((prefix, seq.parse().ok()?))
}

fn find_record<'a>(store: &'a Store, id: &str) -> Result<&'a Record, Fault> {
    parse_id(id)
        .and_then(|(prefix, seq)| store.records.get(&seq).filter(|r| r.id.starts_with(&format!("{prefix}x"))))
        .ok_or_else(|| Fault::new("RECORD_NOT_FOUND", "Record you are trying to access is not found"))
}

fn check_mandatory(mandatory: &[&str], fields: &Map<String, Value>) -> Result<(), Fault> {
    for name in mandatory {
        let present = fields
            .get(*name)
            .is_some_and(|v| !v.is_null() && v.as_str() != Some(""));
        if !present {
            return Err(Fault::new("MANDATORY_FIELDS_MISSING", format!("{name} does not have a value")));
        }
    }
    Ok(())
}

async fn get_challenge(db: &Db, params: &Params) -> Reply {
    let user = param(params, "username")?;
    if user != db.config.user {
        return Err(Fault::new("INVALID_USER_CREDENTIALS", "Invalid username or password"));
    }
    let token = Uuid::new_v4().simple().to_string();
    db.store.write().await.issue_challenge(token.clone());
    Ok(json!({ "token": token, "serverTime": 1_700_000_000, "expireTime": 1_700_000_300 }))
}

async fn login(db: &Db, params: &Params) -> Reply {
    let user = param(params, "username")?;
    let access_key = param(params, "accessKey")?;
    if user != db.config.user {
        return Err(Fault::new("INVALID_USER_CREDENTIALS", "Invalid username or password"));
    }

    let mut store = db.store.write().await;
    store.redeem_challenge(access_key, &db.config.access_key)?;
    let session_name = Uuid::new_v4().simple().to_string();
    store.sessions.insert(session_name.clone());
    info!(user, "login succeeded");

    Ok(json!({
        "sessionName": session_name,
        "userId": USER_ID,
        "version": "0.22",
        "vtigerVersion": "7.5.0",
    }))
}

async fn logout(db: &Db, params: &Params) -> Reply {
    require_session(db, params).await?;
    let session = param(params, "sessionName")?;
    db.store.write().await.sessions.remove(session);
    Ok(json!({ "message": "successfull" }))
}

async fn list_types(db: &Db, params: &Params) -> Reply {
    require_session(db, params).await?;
    let types: Vec<&str> = MODULES.iter().map(|(name, _, _)| *name).collect();
    let information: Map<String, Value> = MODULES
        .iter()
        .map(|(name, _, _)| {
            (
                name.to_string(),
                json!({ "isEntity": true, "label": name, "singular": name.trim_end_matches('s') }),
            )
        })
        .collect();
    Ok(json!({ "types": types, "information": information }))
}

async fn describe(db: &Db, params: &Params) -> Reply {
    require_session(db, params).await?;
    let (name, prefix, mandatory) = module(param(params, "elementType")?)?;
    let fields: Vec<Value> = mandatory
        .iter()
        .map(|field| json!({ "name": field, "label": field, "mandatory": true, "type": { "name": "string" } }))
        .collect();
    Ok(json!({
        "label": name,
        "name": name,
        "createable": true,
        "updateable": true,
        "deleteable": true,
        "retrieveable": true,
        "idPrefix": prefix,
        "fields": fields,
    }))
}

async fn create(db: &Db, params: &Params) -> Reply {
    require_session(db, params).await?;
    let (name, prefix, mandatory) = module(param(params, "elementType")?)?;
    let mut fields = parse_element(params)?;
    fields.remove("id");
    check_mandatory(mandatory, &fields)?;

    let mut store = db.store.write().await;
    store.next_seq += 1;
    let seq = store.next_seq;
    let record = Record {
        id: format!("{prefix}x{seq}"),
        module: name.to_string(),
        fields,
    };
    let body = record.to_json();
    store.records.insert(seq, record);
    Ok(body)
}

async fn retrieve(db: &Db, params: &Params) -> Reply {
    require_session(db, params).await?;
    let store = db.store.read().await;
    find_record(&store, param(params, "id")?).map(Record::to_json)
}

async fn update(db: &Db, params: &Params) -> Reply {
    require_session(db, params).await?;
    let mut fields = parse_element(params)?;
    let id = match fields.remove("id") {
        Some(Value::String(id)) => id,
        _ => return Err(Fault::new("MANDATORY_FIELDS_MISSING", "id does not have a value")),
    };

    let mut store = db.store.write().await;
    let existing = find_record(&store, &id)?;
    let (_, _, mandatory) = module(&existing.module)?;
    check_mandatory(mandatory, &fields)?;

    let record = Record {
        id,
        module: existing.module.clone(),
        fields,
    };
    let body = record.to_json();
    if let Some((_, seq)) = parse_id(&record.id) {
        store.records.insert(seq, record);
    }
    Ok(body)
}

async fn delete(db: &Db, params: &Params) -> Reply {
    require_session(db, params).await?;
    let id = param(params, "id")?;
    let mut store = db.store.write().await;
    find_record(&store, id)?;
    if let Some((_, seq)) = parse_id(id) {
        store.records.remove(&seq);
    }
    Ok(json!({ "status": "successful" }))
}

async fn query(db: &Db, params: &Params) -> Reply {
    require_session(db, params).await?;
    let statement = SelectStatement::parse(param(params, "query")?)?;
    module(&statement.module)?;

    let store = db.store.read().await;
    let mut rows: Vec<&Record> = store
        .records
        .values()
        .filter(|r| r.module == statement.module)
        .filter(|r| statement.matches(r))
        .collect();

    if let Some((field, descending)) = &statement.order {
        rows.sort_by(|a, b| {
            let ord = field_text(a, field).cmp(&field_text(b, field));
            if *descending {
                ord.reverse()
            } else {
                ord
            }
        });
    }

    let rows = rows
        .into_iter()
        .skip(statement.offset)
        .take(statement.limit.unwrap_or(usize::MAX))
        .map(|r| statement.project(r))
        .collect();
    Ok(Value::Array(rows))
}

fn field_text(record: &Record, field: &str) -> String {
    if field == "id" {
        return record.id.clone();
    }
    match record.fields.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// A parsed `SELECT` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectStatement {
    /// `None` for `*`.
    pub fields: Option<Vec<String>>,
    pub module: String,
    pub filter: Option<(String, String)>,
    pub order: Option<(String, bool)>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl SelectStatement {
    pub fn parse(raw: &str) -> Result<Self, Fault> {
        let syntax = |msg: &str| Fault::new("QUERY_SYNTAX_ERROR", format!("Syntax Error on line 1: {msg}"));

        let text = raw.trim();
        let text = text.strip_suffix(';').ok_or_else(|| syntax("missing terminating semicolon"))?;
        let lower = text.to_ascii_lowercase();
        if !lower.starts_with("select ") {
            return Err(syntax("expected SELECT"));
        }
        let from = lower.find(" from ").ok_or_else(|| syntax("expected FROM"))?;
        if from < "select ".len() {
            return Err(syntax("empty select list"));
        }

        let fields = text["select ".len()..from].trim();
        let fields = match fields {
            "" => return Err(syntax("empty select list")),
            "*" => None,
            list => Some(list.split(',').map(|f| f.trim().to_string()).collect()),
        };

        let body_start = from + " from ".len();
        let mut clauses: Vec<(usize, &str)> = [" where ", " order by ", " limit "]
            .into_iter()
            .filter_map(|kw| lower[body_start..].find(kw).map(|i| (body_start + i, kw)))
            .collect();
        clauses.sort();

        let module_end = clauses.first().map(|(i, _)| *i).unwrap_or(text.len());
        let module = text[body_start..module_end].trim().to_string();
        if module.is_empty() {
            return Err(syntax("expected module name"));
        }

        let mut statement = SelectStatement {
            fields,
            module,
            filter: None,
            order: None,
            offset: 0,
            limit: None,
        };

        for (n, (start, kw)) in clauses.iter().enumerate() {
            let end = clauses.get(n + 1).map(|(i, _)| *i).unwrap_or(text.len());
            let body = text[start + kw.len()..end].trim();
            match *kw {
                " where " => {
                    let (field, value) = body.split_once('=').ok_or_else(|| syntax("unsupported WHERE"))?;
                    let value = value.trim().trim_matches('\'').to_string();
                    statement.filter = Some((field.trim().to_string(), value));
                }
                " order by " => {
                    let mut parts = body.split_whitespace();
                    let field = parts.next().ok_or_else(|| syntax("empty ORDER BY"))?;
                    let descending = parts.next().is_some_and(|d| d.eq_ignore_ascii_case("desc"));
                    statement.order = Some((field.to_string(), descending));
                }
                _ => {
                    let number = |s: &str| s.trim().parse::<usize>().map_err(|_| syntax("invalid LIMIT"));
                    match body.split_once(',') {
                        Some((offset, limit)) => {
                            statement.offset = number(offset)?;
                            statement.limit = Some(number(limit)?);
                        }
                        None => statement.limit = Some(number(body)?),
                    }
                }
            }
        }

        Ok(statement)
    }

    fn matches(&self, record: &Record) -> bool {
        match &self.filter {
            Some((field, value)) => field_text(record, field) == *value,
            None => true,
        }
    }

    fn project(&self, record: &Record) -> Value {
        let full = record.to_json();
        let Some(fields) = &self.fields else {
            return full;
        };
        let mut row = Map::new();
        for field in fields {
            row.insert(field.clone(), full.get(field).cloned().unwrap_or(Value::Null));
        }
        Value::Object(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_select() {
        let s = SelectStatement::parse("SELECT * FROM Contacts;").unwrap();
        assert_eq!(s.fields, None);
        assert_eq!(s.module, "Contacts");
        assert_eq!(s.filter, None);
        assert_eq!(s.limit, None);
        assert_eq!(s.offset, 0);
    }

    #[test]
    fn parses_every_clause() {
        let s = SelectStatement::parse("SELECT id, lastname FROM Contacts WHERE lastname='Doe' ORDER BY  lastname DESC LIMIT 10, 5;")
            .unwrap();
        assert_eq!(s.fields, Some(vec!["id".to_string(), "lastname".to_string()]));
        assert_eq!(s.filter, Some(("lastname".to_string(), "Doe".to_string())));
        assert_eq!(s.order, Some(("lastname".to_string(), true)));
        assert_eq!(s.offset, 10);
        assert_eq!(s.limit, Some(5));
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let s = SelectStatement::parse("select * from Leads limit 3;").unwrap();
        assert_eq!(s.module, "Leads");
        assert_eq!(s.limit, Some(3));
    }

    #[test]
    fn rejects_missing_semicolon() {
        let err = SelectStatement::parse("SELECT * FROM Contacts").unwrap_err();
        assert_eq!(err.code, "QUERY_SYNTAX_ERROR");
    }

    #[test]
    fn rejects_empty_select_list() {
        for raw in ["SELECT FROM Contacts;", "SELECT  FROM Contacts;"] {
            let err = SelectStatement::parse(raw).unwrap_err();
            assert_eq!(err.code, "QUERY_SYNTAX_ERROR", "{raw}");
        }
    }

    #[test]
    fn rejects_garbage_limit() {
        let err = SelectStatement::parse("SELECT * FROM Contacts LIMIT many;").unwrap_err();
        assert_eq!(err.code, "QUERY_SYNTAX_ERROR");
    }

    #[test]
    fn record_json_includes_id() {
        let mut fields = Map::new();
        fields.insert("lastname".to_string(), json!("Doe"));
        let record = Record {
            id: "12x1".to_string(),
            module: "Contacts".to_string(),
            fields,
        };
        let json = record.to_json();
        assert_eq!(json["id"], "12x1");
        assert_eq!(json["lastname"], "Doe");
    }

    #[test]
    fn parse_id_splits_prefix_and_sequence() {
        assert_eq!(parse_id("12x34"), Some(("12", 34)));
        assert_eq!(parse_id("nonsense"), None);
        assert_eq!(parse_id("12xabc"), None);
    }

    #[test]
    fn mandatory_fields_must_be_non_empty() {
        let mut fields = Map::new();
        fields.insert("lastname".to_string(), json!(""));
        let err = check_mandatory(&["lastname"], &fields).unwrap_err();
        assert_eq!(err.code, "MANDATORY_FIELDS_MISSING");
    }

    #[test]
    fn pending_challenges_are_bounded() {
        let mut store = Store::default();
        for n in 0..MAX_PENDING_CHALLENGES + 5 {
            store.issue_challenge(format!("tok{n}"));
        }
        assert_eq!(store.challenges.len(), MAX_PENDING_CHALLENGES);
        assert_eq!(store.challenges.front().map(String::as_str), Some("tok5"));
    }

    #[test]
    fn login_clears_superseded_challenges() {
        let mut store = Store::default();
        store.issue_challenge("first".to_string());
        store.issue_challenge("second".to_string());

        let key = md5_hex("secondsecret");
        store.redeem_challenge(&key, "secret").unwrap();
        assert!(store.challenges.is_empty());

        let err = store.redeem_challenge(&md5_hex("firstsecret"), "secret").unwrap_err();
        assert_eq!(err.code, "INVALID_AUTH_TOKEN");
    }

    #[test]
    fn wrong_key_keeps_challenges() {
        let mut store = Store::default();
        store.issue_challenge("tok".to_string());
        let err = store.redeem_challenge(&md5_hex("tokwrong"), "secret").unwrap_err();
        assert_eq!(err.code, "INVALID_USER_CREDENTIALS");
        assert_eq!(store.challenges.len(), 1);
    }
}
