pub mod builder;
pub mod column_type;
pub mod dialect;
pub mod error;
pub mod expr;
pub mod join;
pub mod row;
pub mod select;
pub mod table;
pub mod value;

pub use builder::{Argument, QueryBuilder, render_arguments};
pub use column_type::{ColumnKind, ColumnType, format_date, format_date_time, quote_string};
pub use dialect::{Dialect, MysqlDialect, PostgresDialect, SqliteDialect, is_keyword};
pub use error::{TabulaError, TabulaResult};
pub use expr::*;
pub use join::{ColumnSet, Join, JoinPart, JoinType};
pub use row::ResultRow;
pub use select::{FieldSet, Select, SortOrder};
pub use table::{Column, ColumnDef, Index, ReferenceOption, Table, TableBuilder};
pub use value::{FromValue, SqlEnum, Value, ValueKind};
