use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::StartupHandler;
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::messages::data::DataRow;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::{QUERIES_TOTAL, QUERY_DURATION_SECONDS, command_label};
use crate::sql::{self, Command, SqlError};

pub struct RoombookHandler {
    engine: Arc<Engine>,
    query_parser: Arc<RoombookQueryParser>,
}

impl RoombookHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(RoombookQueryParser),
        }
    }

    async fn run(&self, sql: &str) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(sql).map_err(sql_err)?;
        let label = command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, cmd: Command) -> PgWireResult<Response> {
        match cmd {
            Command::InsertRoom {
                number_of_seats,
                amenities,
                price_per_hour,
            } => {
                let room = self
                    .engine
                    .create_room(number_of_seats, amenities, price_per_hour)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(room_schema());
                let row = encode_room(&schema, &room);
                Ok(query_response(schema, vec![row]))
            }
            Command::InsertBooking {
                customer_name,
                date,
                start_time,
                end_time,
                room_id,
            } => {
                let booking = self
                    .engine
                    .admit(room_id, &customer_name, &date, &start_time, &end_time)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(booking_schema());
                let row = encode_booking(&schema, &booking);
                Ok(query_response(schema, vec![row]))
            }
            Command::SelectRooms => {
                let rooms = self.engine.rooms_with_bookings().await.map_err(engine_err)?;
                let schema = Arc::new(rooms_view_schema());
                let rows = rooms
                    .iter()
                    .map(|r| encode_room_with_bookings(&schema, r))
                    .collect();
                Ok(query_response(schema, rows))
            }
            Command::SelectCustomers => {
                let bookings = self
                    .engine
                    .customers_with_bookings()
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(customers_view_schema());
                let rows = bookings
                    .iter()
                    .map(|b| encode_customer_booking(&schema, b))
                    .collect();
                Ok(query_response(schema, rows))
            }
            Command::SelectCustomerHistory {
                customer_name,
                room_name,
            } => {
                let history = self
                    .engine
                    .customer_room_history(&customer_name, &room_name)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(history_schema());
                let rows = history
                    .bookings
                    .iter()
                    .map(|entry| encode_history_entry(&schema, &history, entry))
                    .collect();
                Ok(query_response(schema, rows))
            }
        }
    }
}

fn query_response(schema: Arc<Vec<FieldInfo>>, rows: Vec<PgWireResult<DataRow>>) -> Response {
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

// ── Schemas ──────────────────────────────────────────────────────

fn text_field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn room_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id", Type::VARCHAR),
        text_field("room_name", Type::VARCHAR),
        text_field("number_of_seats", Type::INT8),
        text_field("amenities", Type::VARCHAR),
        text_field("price_per_hour", Type::FLOAT8),
    ]
}

fn rooms_view_schema() -> Vec<FieldInfo> {
    let mut schema = room_schema();
    schema.push(text_field("bookings", Type::VARCHAR));
    schema
}

fn booking_schema() -> Vec<FieldInfo> {
    vec![
        text_field("booking_id", Type::VARCHAR),
        text_field("customer_name", Type::VARCHAR),
        text_field("date", Type::VARCHAR),
        text_field("start_time", Type::VARCHAR),
        text_field("end_time", Type::VARCHAR),
        text_field("room_id", Type::VARCHAR),
    ]
}

fn customers_view_schema() -> Vec<FieldInfo> {
    vec![
        text_field("customer_name", Type::VARCHAR),
        text_field("room_name", Type::VARCHAR),
        text_field("date", Type::VARCHAR),
        text_field("start_time", Type::VARCHAR),
        text_field("end_time", Type::VARCHAR),
        text_field("booking_id", Type::VARCHAR),
    ]
}

fn history_schema() -> Vec<FieldInfo> {
    vec![
        text_field("booking_id", Type::VARCHAR),
        text_field("customer_name", Type::VARCHAR),
        text_field("room_name", Type::VARCHAR),
        text_field("date", Type::VARCHAR),
        text_field("start_time", Type::VARCHAR),
        text_field("end_time", Type::VARCHAR),
        text_field("booked_at", Type::INT8),
        text_field("status", Type::VARCHAR),
    ]
}

/// Result schema for a statement, derived from its leading keywords so it can
/// be described before parameters are bound.
fn schema_for(sql: &str) -> Vec<FieldInfo> {
    let lower = sql.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .filter(|w| !w.is_empty())
        .collect();
    let table_after = |kw: &str| {
        words
            .iter()
            .position(|w| *w == kw)
            .and_then(|i| words.get(i + 1).copied())
    };

    match words.first().copied() {
        Some("insert") => match table_after("into") {
            Some("rooms") => room_schema(),
            Some("bookings") => booking_schema(),
            _ => vec![],
        },
        Some("select") => match table_after("from") {
            Some("rooms") => rooms_view_schema(),
            Some("customers") => customers_view_schema(),
            Some("bookings") => history_schema(),
            _ => vec![],
        },
        _ => vec![],
    }
}

// ── Row encoding ─────────────────────────────────────────────────

fn json_text<T: serde::Serialize + ?Sized>(value: &T) -> PgWireResult<String> {
    serde_json::to_string(value).map_err(|e| PgWireError::ApiError(Box::new(e)))
}

fn encode_room_fields(encoder: &mut DataRowEncoder, room: &Room) -> PgWireResult<()> {
    encoder.encode_field(&room.id.to_string())?;
    encoder.encode_field(&room.display_name())?;
    encoder.encode_field(&i64::from(room.number_of_seats))?;
    encoder.encode_field(&json_text(&room.amenities)?)?;
    encoder.encode_field(&room.price_per_hour)?;
    Ok(())
}

fn encode_room(schema: &Arc<Vec<FieldInfo>>, room: &Room) -> PgWireResult<DataRow> {
    let mut encoder = DataRowEncoder::new(schema.clone());
    encode_room_fields(&mut encoder, room)?;
    Ok(encoder.take_row())
}

fn encode_room_with_bookings(
    schema: &Arc<Vec<FieldInfo>>,
    view: &RoomWithBookings,
) -> PgWireResult<DataRow> {
    let mut encoder = DataRowEncoder::new(schema.clone());
    encode_room_fields(&mut encoder, &view.room)?;
    let bookings: Vec<serde_json::Value> = view
        .bookings
        .iter()
        .map(|b| {
            serde_json::json!({
                "booking_id": b.id.to_string(),
                "customer_name": b.customer_name,
                "date": b.date,
                "start_time": b.start_time,
                "end_time": b.end_time,
            })
        })
        .collect();
    encoder.encode_field(&json_text(&bookings)?)?;
    Ok(encoder.take_row())
}

fn encode_booking(schema: &Arc<Vec<FieldInfo>>, booking: &Booking) -> PgWireResult<DataRow> {
    let mut encoder = DataRowEncoder::new(schema.clone());
    encoder.encode_field(&booking.id.to_string())?;
    encoder.encode_field(&booking.customer_name)?;
    encoder.encode_field(&booking.date)?;
    encoder.encode_field(&booking.start_time)?;
    encoder.encode_field(&booking.end_time)?;
    encoder.encode_field(&booking.room_id.to_string())?;
    Ok(encoder.take_row())
}

fn encode_customer_booking(
    schema: &Arc<Vec<FieldInfo>>,
    b: &CustomerBooking,
) -> PgWireResult<DataRow> {
    let mut encoder = DataRowEncoder::new(schema.clone());
    encoder.encode_field(&b.customer_name)?;
    encoder.encode_field(&b.room_name)?;
    encoder.encode_field(&b.date)?;
    encoder.encode_field(&b.start_time)?;
    encoder.encode_field(&b.end_time)?;
    encoder.encode_field(&b.booking_id.to_string())?;
    Ok(encoder.take_row())
}

fn encode_history_entry(
    schema: &Arc<Vec<FieldInfo>>,
    history: &CustomerHistory,
    entry: &HistoryEntry,
) -> PgWireResult<DataRow> {
    let mut encoder = DataRowEncoder::new(schema.clone());
    encoder.encode_field(&entry.booking_id.to_string())?;
    encoder.encode_field(&history.customer_name)?;
    encoder.encode_field(&history.room_name)?;
    encoder.encode_field(&entry.date)?;
    encoder.encode_field(&entry.start_time)?;
    encoder.encode_field(&entry.end_time)?;
    encoder.encode_field(&entry.booked_at)?;
    encoder.encode_field(&entry.status.as_str().to_string())?;
    Ok(encoder.take_row())
}

#[async_trait]
impl SimpleQueryHandler for RoombookHandler {
    async fn do_query<C>(&self, _client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(vec![self.run(query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct RoombookQueryParser;

#[async_trait]
impl QueryParser for RoombookQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(schema_for(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for RoombookHandler {
    type Statement = String;
    type QueryParser = RoombookQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        self.run(&sql).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            schema_for(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(schema_for(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if let Ok(n) = sql[start..i].parse::<usize>() {
                max = max.max(n);
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    bind_params(&portal.statement.statement, &portal.parameters)
}

/// Single pass over `sql`: placeholders inside quoted literals stay as
/// written, and bound values are never rescanned.
fn bind_params<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();
    let mut quote: Option<char> = None;

    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
            }
            '$' => {
                let digits_start = i + 1;
                let mut digits_end = digits_start;
                while let Some(&(j, d)) = chars.peek() {
                    if !d.is_ascii_digit() {
                        break;
                    }
                    digits_end = j + 1;
                    chars.next();
                }
                let n: usize = sql[digits_start..digits_end].parse().unwrap_or(0);
                match params.get(n.wrapping_sub(1)) {
                    Some(Some(bytes)) => {
                        let text = String::from_utf8_lossy(bytes.as_ref());
                        out.push('\'');
                        out.push_str(&text.replace('\'', "''"));
                        out.push('\'');
                    }
                    Some(None) => out.push_str("NULL"),
                    None => out.push_str(&sql[i..digits_end]),
                }
            }
            _ => out.push(c),
        }
    }
    out
}

// ── Factory ──────────────────────────────────────────────────────

pub struct RoombookFactory {
    handler: Arc<RoombookHandler>,
    noop: Arc<NoopHandler>,
}

impl RoombookFactory {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            handler: Arc::new(RoombookHandler::new(engine)),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for RoombookFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.noop.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it disconnects.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    let factory = Arc::new(RoombookFactory::new(engine));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::InvalidInterval(_) | EngineError::InvalidRoom(_) => "22023",
        EngineError::RoomNotFound(_) => "P0002",
        EngineError::SlotConflict(_) => "23P01",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::StorageFailure(_) => "58000",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        sqlstate(&e).into(),
        e.to_string(),
    )))
}

fn sql_err(e: SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
