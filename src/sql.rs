use sqlparser::ast::{self, Expr, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

/// Parsed command from SQL input.
///
/// INSERT values are positional, in the column order shown by each variant.
#[derive(Debug, PartialEq)]
pub enum Command {
    /// `INSERT INTO rooms (number_of_seats, amenities, price_per_hour)`
    InsertRoom {
        number_of_seats: u32,
        amenities: Vec<String>,
        price_per_hour: f64,
    },
    /// `INSERT INTO bookings (customer_name, date, start_time, end_time, room_id)`
    InsertBooking {
        customer_name: String,
        date: String,
        start_time: String,
        end_time: String,
        room_id: Ulid,
    },
    /// `SELECT * FROM rooms`
    SelectRooms,
    /// `SELECT * FROM customers`
    SelectCustomers,
    /// `SELECT * FROM bookings WHERE customer_name = .. AND room_name = ..`
    SelectCustomerHistory {
        customer_name: String,
        room_name: String,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }
    if stmts.len() > 1 {
        return Err(SqlError::Unsupported("multiple statements".into()));
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;

    match table.as_str() {
        "rooms" => {
            if values.len() != 3 {
                return Err(SqlError::WrongArity("rooms", 3, values.len()));
            }
            Ok(Command::InsertRoom {
                number_of_seats: parse_u32(&values[0])?,
                amenities: parse_string_list(&values[1])?,
                price_per_hour: parse_f64(&values[2])?,
            })
        }
        "bookings" => {
            if values.len() != 5 {
                return Err(SqlError::WrongArity("bookings", 5, values.len()));
            }
            Ok(Command::InsertBooking {
                customer_name: parse_text(&values[0])?,
                date: parse_text(&values[1])?,
                start_time: parse_text(&values[2])?,
                end_time: parse_text(&values[3])?,
                room_id: parse_ulid(&values[4])?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    match table.as_str() {
        "rooms" => Ok(Command::SelectRooms),
        "customers" => Ok(Command::SelectCustomers),
        "bookings" => {
            let (mut customer_name, mut room_name) = (None, None);
            if let Some(selection) = &select.selection {
                extract_history_filters(selection, &mut customer_name, &mut room_name)?;
            }
            Ok(Command::SelectCustomerHistory {
                customer_name: customer_name.ok_or(SqlError::MissingFilter("customer_name"))?,
                room_name: room_name.ok_or(SqlError::MissingFilter("room_name"))?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn extract_history_filters(
    expr: &Expr,
    customer_name: &mut Option<String>,
    room_name: &mut Option<String>,
) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                extract_history_filters(left, customer_name, room_name)?;
                extract_history_filters(right, customer_name, room_name)?;
            }
            ast::BinaryOperator::Eq => match expr_column_name(left).as_deref() {
                Some("customer_name") => *customer_name = Some(parse_string(right)?),
                Some("room_name") => *room_name = Some(parse_string(right)?),
                _ => {}
            },
            _ => {}
        },
        Expr::Nested(inner) => extract_history_filters(inner, customer_name, room_name)?,
        _ => {}
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

/// A text column where NULL reads as the empty string, so the engine's
/// validation rejects it like any other blank value.
fn parse_text(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(String::new()),
        _ => parse_string(expr),
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    let s = parse_string(expr)?;
    Ulid::from_string(&s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
}

fn parse_f64(expr: &Expr) -> Result<f64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad number: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_f64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_f64(expr)?;
    if v.fract() != 0.0 || v < 0.0 || v > u32::MAX as f64 {
        return Err(SqlError::Parse(format!("{v} is not a valid seat count")));
    }
    Ok(v as u32)
}

/// `ARRAY['a', 'b']` or a JSON array string such as `'["a", "b"]'`.
fn parse_string_list(expr: &Expr) -> Result<Vec<String>, SqlError> {
    match expr {
        Expr::Array(ast::Array { elem, .. }) => elem.iter().map(parse_string).collect(),
        _ => {
            let text = parse_string(expr)?;
            serde_json::from_str(&text).map_err(|e| SqlError::Parse(format!("bad amenities list: {e}")))
        }
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
