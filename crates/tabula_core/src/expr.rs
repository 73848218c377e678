//! Expression trees over declared columns. Every node renders itself into a
//! [`QueryBuilder`], which decides between placeholders and inline literals.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use time::{Date, PrimitiveDateTime};

use crate::{
    Column, ColumnKind, ColumnType, QueryBuilder, Select, TabulaError, TabulaResult, Value,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Neq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    Like,
    NotLike,
    And,
    Or,
}

impl BinaryOp {
    fn sql(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Neq => "<>",
            BinaryOp::Less => "<",
            BinaryOp::LessEq => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEq => ">=",
            BinaryOp::Like => "LIKE",
            BinaryOp::NotLike => "NOT LIKE",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }

    fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Plus,
    Minus,
    Times,
    Divide,
}

impl ArithOp {
    fn sql(self) -> &'static str {
        match self {
            ArithOp::Plus => "+",
            ArithOp::Minus => "-",
            ArithOp::Times => "*",
            ArithOp::Divide => "/",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    CountDistinct,
    Sum,
    Min,
    Max,
    Avg,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Column(Column),
    Param {
        value: Value,
        column_type: ColumnType,
    },
    Literal {
        value: Value,
        column_type: ColumnType,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Arith {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
        column_type: ColumnType,
    },
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    Exists(Box<Select>),
    Aggregate {
        function: AggregateFn,
        expr: Box<Expr>,
    },
    Substring {
        expr: Box<Expr>,
        start: i64,
        length: i64,
    },
    Case {
        branches: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
}

/// Right-hand side of a comparison: a plain value or another expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Value(Value),
    Expr(Expr),
}

impl From<Expr> for Operand {
    fn from(value: Expr) -> Self {
        Operand::Expr(value)
    }
}

impl From<&Column> for Operand {
    fn from(value: &Column) -> Self {
        Operand::Expr(Expr::Column(value.clone()))
    }
}

impl From<Column> for Operand {
    fn from(value: Column) -> Self {
        Operand::Expr(Expr::Column(value))
    }
}

impl From<Value> for Operand {
    fn from(value: Value) -> Self {
        Operand::Value(value)
    }
}

macro_rules! value_operand {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Operand {
            fn from(value: $ty) -> Self {
                Operand::Value(value.into())
            }
        })*
    };
}

value_operand!(i64, i32, &str, String, bool, Decimal, Date, PrimitiveDateTime, Vec<u8>);

impl<T: Into<Value>> From<Option<T>> for Operand {
    fn from(value: Option<T>) -> Self {
        Operand::Value(value.into())
    }
}

impl From<&Column> for Expr {
    fn from(value: &Column) -> Self {
        Expr::Column(value.clone())
    }
}

impl From<Column> for Expr {
    fn from(value: Column) -> Self {
        Expr::Column(value)
    }
}

impl From<&Expr> for Expr {
    fn from(value: &Expr) -> Self {
        value.clone()
    }
}

fn comparable(left: &ColumnKind, right: &ColumnKind) -> bool {
    let numeric = |kind: &ColumnKind| kind.is_integral() || matches!(kind, ColumnKind::Decimal { .. });
    (numeric(left) && numeric(right))
        || (left.is_textual() && right.is_textual())
        || std::mem::discriminant(left) == std::mem::discriminant(right)
}

/// The type a comparison value is checked against: textual columns accept any
/// length of string on the right.
fn comparison_type(column_type: &ColumnType) -> ColumnType {
    if column_type.kind().is_textual() {
        ColumnType::text()
    } else {
        ColumnType::new(column_type.kind().clone())
    }
}

fn natural_type(value: &Value) -> Option<ColumnType> {
    Some(match value {
        Value::Null | Value::Enum(_) => return None,
        Value::Int(_) => ColumnType::long(),
        Value::Str(_) => ColumnType::text(),
        Value::Decimal(raw) => ColumnType::decimal(38, raw.scale()),
        Value::Bool(_) => ColumnType::boolean(),
        Value::Date(_) => ColumnType::new(ColumnKind::Date),
        Value::DateTime(_) => ColumnType::new(ColumnKind::DateTime),
        Value::Blob(_) => ColumnType::new(ColumnKind::Blob),
    })
}

/// Wraps a value as a bound parameter or, for types the drivers bind poorly,
/// as an inline literal.
fn wrap(column_type: ColumnType, value: Value) -> TabulaResult<Expr> {
    let value = column_type.validate(&value)?;
    if column_type.is_bindable() {
        Ok(Expr::Param { value, column_type })
    } else {
        Ok(Expr::Literal { value, column_type })
    }
}

pub fn param(column_type: ColumnType, value: impl Into<Value>) -> TabulaResult<Expr> {
    wrap(column_type, value.into())
}

pub fn int_param(value: i64) -> Expr {
    Expr::Param {
        value: Value::Int(value),
        column_type: ColumnType::long(),
    }
}

pub fn string_param(value: impl Into<String>) -> Expr {
    Expr::Param {
        value: Value::Str(value.into()),
        column_type: ColumnType::text(),
    }
}

pub fn int_literal(value: i64) -> Expr {
    Expr::Literal {
        value: Value::Int(value),
        column_type: ColumnType::long(),
    }
}

pub fn string_literal(value: impl Into<String>) -> Expr {
    Expr::Literal {
        value: Value::Str(value.into()),
        column_type: ColumnType::text(),
    }
}

pub fn bool_literal(value: bool) -> Expr {
    Expr::Literal {
        value: Value::Bool(value),
        column_type: ColumnType::boolean(),
    }
}

pub fn decimal_literal(value: Decimal) -> Expr {
    Expr::Literal {
        value: Value::Decimal(value),
        column_type: ColumnType::decimal(38, value.scale()),
    }
}

fn aggregate(function: AggregateFn, expr: impl Into<Expr>) -> Expr {
    Expr::Aggregate {
        function,
        expr: Box::new(expr.into()),
    }
}

pub fn count(expr: impl Into<Expr>) -> Expr {
    aggregate(AggregateFn::Count, expr)
}

pub fn count_distinct(expr: impl Into<Expr>) -> Expr {
    aggregate(AggregateFn::CountDistinct, expr)
}

pub fn sum(expr: impl Into<Expr>) -> Expr {
    aggregate(AggregateFn::Sum, expr)
}

pub fn min(expr: impl Into<Expr>) -> Expr {
    aggregate(AggregateFn::Min, expr)
}

pub fn max(expr: impl Into<Expr>) -> Expr {
    aggregate(AggregateFn::Max, expr)
}

pub fn avg(expr: impl Into<Expr>) -> Expr {
    aggregate(AggregateFn::Avg, expr)
}

/// `length` characters starting at the 1-based position `start`.
pub fn substring(expr: impl Into<Expr>, start: i64, length: i64) -> TabulaResult<Expr> {
    let expr = expr.into();
    if !expr.column_type().kind().is_textual() {
        return Err(TabulaError::type_mismatch(format!(
            "substring of non-textual {:?}",
            expr.column_type().kind()
        )));
    }
    if start < 1 || length < 0 {
        return Err(TabulaError::invalid(format!(
            "substring range start {start} length {length}"
        )));
    }
    Ok(Expr::Substring {
        expr: Box::new(expr),
        start,
        length,
    })
}

pub fn exists(select: Select) -> Expr {
    Expr::Exists(Box::new(select))
}

pub fn not_exists(select: Select) -> Expr {
    Expr::Not(Box::new(exists(select)))
}

pub fn case_when(condition: Expr, value: impl Into<Expr>) -> CaseBuilder {
    CaseBuilder {
        branches: vec![(condition, value.into())],
    }
}

pub struct CaseBuilder {
    branches: Vec<(Expr, Expr)>,
}

impl CaseBuilder {
    pub fn when(mut self, condition: Expr, value: impl Into<Expr>) -> Self {
        self.branches.push((condition, value.into()));
        self
    }

    pub fn otherwise(self, value: impl Into<Expr>) -> Expr {
        Expr::Case {
            branches: self.branches,
            otherwise: Some(Box::new(value.into())),
        }
    }

    pub fn end(self) -> Expr {
        Expr::Case {
            branches: self.branches,
            otherwise: None,
        }
    }
}

#[allow(clippy::should_implement_trait)]
impl Expr {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Expr::Column(column) => column.column_type().clone(),
            Expr::Param { column_type, .. }
            | Expr::Literal { column_type, .. }
            | Expr::Arith { column_type, .. } => column_type.clone(),
            Expr::Binary { .. }
            | Expr::Not(_)
            | Expr::IsNull(_)
            | Expr::IsNotNull(_)
            | Expr::InList { .. }
            | Expr::Exists(_) => ColumnType::boolean(),
            Expr::Aggregate { function, expr } => match function {
                AggregateFn::Count | AggregateFn::CountDistinct => ColumnType::long(),
                AggregateFn::Avg => ColumnType::decimal(38, 10).nullable(),
                AggregateFn::Sum if expr.column_type().kind().is_integral() => {
                    ColumnType::long().nullable()
                }
                AggregateFn::Sum | AggregateFn::Min | AggregateFn::Max => {
                    expr.column_type().nullable()
                }
            },
            Expr::Substring { expr, .. } => {
                if expr.column_type().is_nullable() {
                    ColumnType::text().nullable()
                } else {
                    ColumnType::text()
                }
            }
            Expr::Case {
                branches,
                otherwise,
            } => {
                let base = branches
                    .first()
                    .map(|(_, value)| value.column_type())
                    .unwrap_or_else(ColumnType::text);
                let nullable = otherwise
                    .as_ref()
                    .is_none_or(|value| value.column_type().is_nullable())
                    || branches
                        .iter()
                        .any(|(_, value)| value.column_type().is_nullable());
                if nullable { base.nullable() } else { base }
            }
        }
    }

    fn binary(self, op: BinaryOp, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(self),
            right: Box::new(right),
        }
    }

    fn compare(self, op: BinaryOp, other: Operand) -> TabulaResult<Expr> {
        let own_type = self.column_type();
        match other {
            Operand::Value(Value::Null) => match op {
                BinaryOp::Eq => self.null_check(false),
                BinaryOp::Neq => self.null_check(true),
                _ => Err(TabulaError::null_comparison(format!(
                    "cannot apply {} to null",
                    op.sql()
                ))),
            },
            Operand::Value(value) => {
                let right = wrap(comparison_type(&own_type), value)?;
                Ok(self.binary(op, right))
            }
            Operand::Expr(right) => {
                let right_type = right.column_type();
                if !comparable(own_type.kind(), right_type.kind()) {
                    return Err(TabulaError::type_mismatch(format!(
                        "cannot compare {:?} with {:?}",
                        own_type.kind(),
                        right_type.kind()
                    )));
                }
                Ok(self.binary(op, right))
            }
        }
    }

    fn null_check(self, negated: bool) -> TabulaResult<Expr> {
        if !self.column_type().is_nullable() {
            return Err(TabulaError::null_comparison(format!(
                "{self:?} is not nullable; compare with is_null explicitly"
            )));
        }
        Ok(if negated {
            Expr::IsNotNull(Box::new(self))
        } else {
            Expr::IsNull(Box::new(self))
        })
    }

    pub fn eq(self, other: impl Into<Operand>) -> TabulaResult<Expr> {
        self.compare(BinaryOp::Eq, other.into())
    }

    pub fn neq(self, other: impl Into<Operand>) -> TabulaResult<Expr> {
        self.compare(BinaryOp::Neq, other.into())
    }

    pub fn less(self, other: impl Into<Operand>) -> TabulaResult<Expr> {
        self.compare(BinaryOp::Less, other.into())
    }

    pub fn less_eq(self, other: impl Into<Operand>) -> TabulaResult<Expr> {
        self.compare(BinaryOp::LessEq, other.into())
    }

    pub fn greater(self, other: impl Into<Operand>) -> TabulaResult<Expr> {
        self.compare(BinaryOp::Greater, other.into())
    }

    pub fn greater_eq(self, other: impl Into<Operand>) -> TabulaResult<Expr> {
        self.compare(BinaryOp::GreaterEq, other.into())
    }

    fn pattern(self, op: BinaryOp, pattern: String) -> TabulaResult<Expr> {
        if !self.column_type().kind().is_textual() {
            return Err(TabulaError::type_mismatch(format!(
                "{} on non-textual {:?}",
                op.sql(),
                self.column_type().kind()
            )));
        }
        Ok(self.binary(op, string_param(pattern)))
    }

    pub fn like(self, pattern: impl Into<String>) -> TabulaResult<Expr> {
        self.pattern(BinaryOp::Like, pattern.into())
    }

    pub fn not_like(self, pattern: impl Into<String>) -> TabulaResult<Expr> {
        self.pattern(BinaryOp::NotLike, pattern.into())
    }

    pub fn and(self, other: Expr) -> Expr {
        self.binary(BinaryOp::And, other)
    }

    pub fn or(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Or, other)
    }

    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull(Box::new(self))
    }

    pub fn is_not_null(self) -> Expr {
        Expr::IsNotNull(Box::new(self))
    }

    fn list<I, V>(self, values: I, negated: bool) -> TabulaResult<Expr>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let item_type = comparison_type(&self.column_type());
        let list = values
            .into_iter()
            .map(|value| {
                let value = value.into();
                if value.is_null() {
                    return Err(TabulaError::null_comparison("null inside IN list"));
                }
                wrap(item_type.clone(), value)
            })
            .collect::<TabulaResult<Vec<_>>>()?;
        Ok(Expr::InList {
            expr: Box::new(self),
            list,
            negated,
        })
    }

    pub fn in_list<I, V>(self, values: I) -> TabulaResult<Expr>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.list(values, false)
    }

    pub fn not_in_list<I, V>(self, values: I) -> TabulaResult<Expr>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.list(values, true)
    }

    fn arith(self, op: ArithOp, other: Operand) -> TabulaResult<Expr> {
        let left_type = self.column_type();
        let right = match other {
            Operand::Value(Value::Null) => {
                return Err(TabulaError::null_comparison(format!(
                    "cannot apply {} to null",
                    op.sql()
                )));
            }
            Operand::Value(value) => {
                let own = ColumnType::new(left_type.kind().clone());
                match own.validate(&value) {
                    Ok(_) => wrap(own, value)?,
                    Err(err) => match natural_type(&value) {
                        Some(column_type) => wrap(column_type, value)?,
                        None => return Err(err),
                    },
                }
            }
            Operand::Expr(expr) => expr,
        };
        let right_type = right.column_type();
        let numeric =
            |kind: &ColumnKind| kind.is_integral() || matches!(kind, ColumnKind::Decimal { .. });
        if !numeric(left_type.kind()) || !numeric(right_type.kind()) {
            return Err(TabulaError::type_mismatch(format!(
                "arithmetic on {:?} and {:?}",
                left_type.kind(),
                right_type.kind()
            )));
        }
        let mut column_type = match (left_type.kind(), right_type.kind()) {
            (ColumnKind::Decimal { .. }, _) => ColumnType::new(left_type.kind().clone()),
            (_, ColumnKind::Decimal { .. }) => ColumnType::new(right_type.kind().clone()),
            _ => ColumnType::long(),
        };
        if left_type.is_nullable() || right_type.is_nullable() {
            column_type = column_type.nullable();
        }
        Ok(Expr::Arith {
            op,
            left: Box::new(self),
            right: Box::new(right),
            column_type,
        })
    }

    pub fn plus(self, other: impl Into<Operand>) -> TabulaResult<Expr> {
        self.arith(ArithOp::Plus, other.into())
    }

    pub fn minus(self, other: impl Into<Operand>) -> TabulaResult<Expr> {
        self.arith(ArithOp::Minus, other.into())
    }

    pub fn times(self, other: impl Into<Operand>) -> TabulaResult<Expr> {
        self.arith(ArithOp::Times, other.into())
    }

    pub fn div(self, other: impl Into<Operand>) -> TabulaResult<Expr> {
        self.arith(ArithOp::Divide, other.into())
    }

    /// Names of the tables whose columns this expression reads. Tables that a
    /// nested subselect brings into scope itself are not counted.
    pub fn referenced_tables(&self) -> BTreeSet<String> {
        let mut tables = BTreeSet::new();
        self.collect_tables(&mut tables);
        tables
    }

    fn collect_tables(&self, tables: &mut BTreeSet<String>) {
        match self {
            Expr::Column(column) => {
                tables.insert(column.table_name().to_string());
            }
            Expr::Param { .. } | Expr::Literal { .. } => {}
            Expr::Binary { left, right, .. } | Expr::Arith { left, right, .. } => {
                left.collect_tables(tables);
                right.collect_tables(tables);
            }
            Expr::Not(expr)
            | Expr::IsNull(expr)
            | Expr::IsNotNull(expr)
            | Expr::Aggregate { expr, .. }
            | Expr::Substring { expr, .. } => expr.collect_tables(tables),
            Expr::InList { expr, list, .. } => {
                expr.collect_tables(tables);
                for item in list {
                    item.collect_tables(tables);
                }
            }
            Expr::Exists(select) => {
                let own: BTreeSet<String> = select
                    .source()
                    .target_tables()
                    .iter()
                    .map(|table| table.name().to_string())
                    .collect();
                for name in select.referenced_tables() {
                    if !own.contains(&name) {
                        tables.insert(name);
                    }
                }
            }
            Expr::Case {
                branches,
                otherwise,
            } => {
                for (condition, value) in branches {
                    condition.collect_tables(tables);
                    value.collect_tables(tables);
                }
                if let Some(value) = otherwise {
                    value.collect_tables(tables);
                }
            }
        }
    }

    pub fn to_sql(&self, builder: &mut QueryBuilder<'_>) -> TabulaResult<String> {
        match self {
            Expr::Column(column) => Ok(builder.column_identity(column)),
            Expr::Param { value, column_type } => builder.register_argument(column_type, value),
            Expr::Literal { value, column_type } => builder.literal(column_type, value),
            Expr::Binary { op, left, right } => {
                let left = operand_sql(*op, left, builder)?;
                let right = operand_sql(*op, right, builder)?;
                Ok(format!("{left} {} {right}", op.sql()))
            }
            Expr::Arith {
                op, left, right, ..
            } => {
                let left_sql = left.to_sql(builder)?;
                let right_sql = right.to_sql(builder)?;
                match op {
                    ArithOp::Times | ArithOp::Divide => {
                        Ok(format!("({left_sql}) {} ({right_sql})", op.sql()))
                    }
                    ArithOp::Plus => Ok(format!("{left_sql} + {right_sql}")),
                    // a - (b + c) and a - (b - c) do not associate
                    ArithOp::Minus => match right.as_ref() {
                        Expr::Arith {
                            op: ArithOp::Plus | ArithOp::Minus,
                            ..
                        } => Ok(format!("{left_sql} - ({right_sql})")),
                        _ => Ok(format!("{left_sql} - {right_sql}")),
                    },
                }
            }
            Expr::Not(expr) => Ok(format!("NOT ({})", expr.to_sql(builder)?)),
            Expr::IsNull(expr) => Ok(format!("{} IS NULL", grouped(expr, builder)?)),
            Expr::IsNotNull(expr) => Ok(format!("{} IS NOT NULL", grouped(expr, builder)?)),
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                if list.is_empty() {
                    return Ok(if *negated { "1 = 1" } else { "1 = 0" }.to_string());
                }
                let expr = grouped(expr, builder)?;
                let items = list
                    .iter()
                    .map(|item| item.to_sql(builder))
                    .collect::<TabulaResult<Vec<_>>>()?;
                let keyword = if *negated { "NOT IN" } else { "IN" };
                Ok(format!("{expr} {keyword} ({})", items.join(", ")))
            }
            Expr::Exists(select) => Ok(format!("EXISTS ({})", select.to_sql(builder)?)),
            Expr::Aggregate { function, expr } => {
                let inner = expr.to_sql(builder)?;
                Ok(match function {
                    AggregateFn::Count => format!("COUNT({inner})"),
                    AggregateFn::CountDistinct => format!("COUNT(DISTINCT {inner})"),
                    AggregateFn::Sum => format!("SUM({inner})"),
                    AggregateFn::Min => format!("MIN({inner})"),
                    AggregateFn::Max => format!("MAX({inner})"),
                    AggregateFn::Avg => format!("AVG({inner})"),
                })
            }
            Expr::Substring {
                expr,
                start,
                length,
            } => Ok(format!(
                "{}({}, {start}, {length})",
                builder.dialect().substring_function(),
                expr.to_sql(builder)?
            )),
            Expr::Case {
                branches,
                otherwise,
            } => {
                let mut sql = String::from("CASE");
                for (condition, value) in branches {
                    sql.push_str(&format!(
                        " WHEN {} THEN {}",
                        condition.to_sql(builder)?,
                        value.to_sql(builder)?
                    ));
                }
                if let Some(value) = otherwise {
                    sql.push_str(&format!(" ELSE {}", value.to_sql(builder)?));
                }
                sql.push_str(" END");
                Ok(sql)
            }
        }
    }
}

/// An operand of `parent`, parenthesised when it would otherwise bind looser.
fn operand_sql(
    parent: BinaryOp,
    child: &Expr,
    builder: &mut QueryBuilder<'_>,
) -> TabulaResult<String> {
    let sql = child.to_sql(builder)?;
    let wrap = match child {
        Expr::Binary {
            op: BinaryOp::Or, ..
        } => parent != BinaryOp::Or,
        Expr::Binary { .. } => !parent.is_logical(),
        _ => false,
    };
    Ok(if wrap { format!("({sql})") } else { sql })
}

fn grouped(expr: &Expr, builder: &mut QueryBuilder<'_>) -> TabulaResult<String> {
    let sql = expr.to_sql(builder)?;
    Ok(match expr {
        Expr::Binary { .. } | Expr::Arith { .. } => format!("({sql})"),
        _ => sql,
    })
}

#[allow(clippy::should_implement_trait)]
impl Column {
    pub fn expr(&self) -> Expr {
        Expr::Column(self.clone())
    }

    pub fn eq(&self, other: impl Into<Operand>) -> TabulaResult<Expr> {
        self.expr().eq(other)
    }

    pub fn neq(&self, other: impl Into<Operand>) -> TabulaResult<Expr> {
        self.expr().neq(other)
    }

    pub fn less(&self, other: impl Into<Operand>) -> TabulaResult<Expr> {
        self.expr().less(other)
    }

    pub fn less_eq(&self, other: impl Into<Operand>) -> TabulaResult<Expr> {
        self.expr().less_eq(other)
    }

    pub fn greater(&self, other: impl Into<Operand>) -> TabulaResult<Expr> {
        self.expr().greater(other)
    }

    pub fn greater_eq(&self, other: impl Into<Operand>) -> TabulaResult<Expr> {
        self.expr().greater_eq(other)
    }

    pub fn like(&self, pattern: impl Into<String>) -> TabulaResult<Expr> {
        self.expr().like(pattern)
    }

    pub fn not_like(&self, pattern: impl Into<String>) -> TabulaResult<Expr> {
        self.expr().not_like(pattern)
    }

    pub fn is_null(&self) -> Expr {
        self.expr().is_null()
    }

    pub fn is_not_null(&self) -> Expr {
        self.expr().is_not_null()
    }

    pub fn in_list<I, V>(&self, values: I) -> TabulaResult<Expr>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.expr().in_list(values)
    }

    pub fn not_in_list<I, V>(&self, values: I) -> TabulaResult<Expr>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.expr().not_in_list(values)
    }

    pub fn plus(&self, other: impl Into<Operand>) -> TabulaResult<Expr> {
        self.expr().plus(other)
    }

    pub fn minus(&self, other: impl Into<Operand>) -> TabulaResult<Expr> {
        self.expr().minus(other)
    }

    pub fn times(&self, other: impl Into<Operand>) -> TabulaResult<Expr> {
        self.expr().times(other)
    }

    pub fn div(&self, other: impl Into<Operand>) -> TabulaResult<Expr> {
        self.expr().div(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SqliteDialect, Table};
    use time::macros::date;

    struct Fixture {
        id: Column,
        name: Column,
        city: Column,
        rank: Column,
        born: Column,
    }

    fn fixture() -> Fixture {
        let mut users = Table::builder("users");
        let id = users.integer("id").primary_key().column();
        let name = users.varchar("name", 50).column();
        let city = users.integer("city_id").nullable().column();
        let rank = users.decimal("rank", 12, 2).column();
        let born = users.date("born").column();
        users.build().unwrap();
        Fixture {
            id,
            name,
            city,
            rank,
            born,
        }
    }

    fn render(expr: &Expr) -> (String, usize) {
        let dialect = SqliteDialect;
        let mut builder = QueryBuilder::new(&dialect);
        let sql = expr.to_sql(&mut builder).unwrap();
        (sql, builder.args().len())
    }

    #[test]
    fn or_under_and_is_parenthesised() {
        let f = fixture();
        let expr = f
            .name
            .eq("a")
            .unwrap()
            .or(f.city.is_null())
            .and(f.id.greater(3).unwrap());
        assert_eq!(
            render(&expr).0,
            "(users.name = ? OR users.city_id IS NULL) AND users.id > ?"
        );
    }

    #[test]
    fn nested_and_gets_no_extra_parentheses() {
        let f = fixture();
        let expr = f
            .id
            .eq(1)
            .unwrap()
            .and(f.id.eq(2).unwrap())
            .and(f.id.eq(3).unwrap());
        assert_eq!(
            render(&expr),
            ("users.id = ? AND users.id = ? AND users.id = ?".to_string(), 3)
        );
        let or_chain = f.id.eq(1).unwrap().or(f.id.eq(2).unwrap().or(f.id.eq(3).unwrap()));
        assert_eq!(
            render(&or_chain).0,
            "users.id = ? OR users.id = ? OR users.id = ?"
        );
    }

    #[test]
    fn arithmetic_parenthesises_only_products() {
        let f = fixture();
        let sum = f.id.plus(1).unwrap().minus(&f.id).unwrap();
        assert_eq!(render(&sum).0, "users.id + ? - users.id");
        let product = f.id.plus(1).unwrap().times(2).unwrap();
        assert_eq!(render(&product).0, "(users.id + ?) * (?)");
        let quotient = f.rank.div(&f.id).unwrap();
        assert_eq!(render(&quotient).0, "(users.rank) / (users.id)");
        assert!(matches!(
            quotient.column_type().kind(),
            ColumnKind::Decimal { .. }
        ));
    }

    #[test]
    fn subtracted_sums_keep_their_grouping() {
        let f = fixture();
        let difference = f.id.minus(f.id.plus(1).unwrap()).unwrap();
        assert_eq!(render(&difference).0, "users.id - (users.id + ?)");
        let nested = f.id.minus(f.id.minus(2).unwrap()).unwrap();
        assert_eq!(render(&nested).0, "users.id - (users.id - ?)");
        let added = f.id.plus(f.id.minus(2).unwrap()).unwrap();
        assert_eq!(render(&added).0, "users.id + users.id - ?");
    }

    #[test]
    fn null_comparisons_translate_or_fail() {
        let f = fixture();
        assert_eq!(f.city.eq(None::<i64>).unwrap(), f.city.is_null());
        assert_eq!(f.city.neq(Value::Null).unwrap(), f.city.is_not_null());
        let err = f.name.eq(Value::Null).unwrap_err();
        assert!(matches!(err, TabulaError::NullComparison { .. }));
        let err = f.city.less(Value::Null).unwrap_err();
        assert!(matches!(err, TabulaError::NullComparison { .. }));
    }

    #[test]
    fn mismatched_operands_are_rejected() {
        let f = fixture();
        assert!(matches!(
            f.id.eq("seven").unwrap_err(),
            TabulaError::TypeMismatch { .. }
        ));
        assert!(f.id.eq(&f.name).is_err());
        assert!(f.id.like("1%").is_err());
        assert!(f.name.plus(1).is_err());
    }

    #[test]
    fn dates_render_inline() {
        let f = fixture();
        let (sql, args) = render(&f.born.less(date!(2000 - 01 - 01)).unwrap());
        assert_eq!(sql, "users.born < '2000-01-01'");
        assert_eq!(args, 0);
    }

    #[test]
    fn lists_case_and_substring() {
        let f = fixture();
        let (sql, args) = render(&f.id.in_list([1, 2, 3]).unwrap());
        assert_eq!(sql, "users.id IN (?, ?, ?)");
        assert_eq!(args, 3);
        assert_eq!(render(&f.id.not_in_list(Vec::<i64>::new()).unwrap()).0, "1 = 1");

        let case = case_when(f.city.is_null(), string_literal("nowhere"))
            .otherwise(string_literal("somewhere"));
        assert_eq!(
            render(&case).0,
            "CASE WHEN users.city_id IS NULL THEN 'nowhere' ELSE 'somewhere' END"
        );
        assert!(!case.column_type().is_nullable());

        let prefix = substring(&f.name, 1, 3).unwrap();
        assert_eq!(render(&prefix).0, "substr(users.name, 1, 3)");
        assert!(substring(&f.id, 1, 3).is_err());
    }

    #[test]
    fn aggregates_and_referenced_tables() {
        let f = fixture();
        assert_eq!(render(&count(&f.id)).0, "COUNT(users.id)");
        assert_eq!(render(&count_distinct(&f.city)).0, "COUNT(DISTINCT users.city_id)");
        assert!(sum(&f.id).column_type().is_nullable());
        assert!(!count(&f.id).column_type().is_nullable());
        let tables = f.id.eq(1).unwrap().referenced_tables();
        assert_eq!(tables.into_iter().collect::<Vec<_>>(), vec!["users".to_string()]);
    }
}
