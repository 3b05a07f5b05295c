// SQLite engine layer
//
// - connection: one open engine connection plus attach, hooks and transactions
// - statement: multi-statement compilation and execution
// - params: value conversion and parameter binding
// - query: row extraction

pub mod connection;
pub mod params;
pub mod query;
pub mod statement;

pub use connection::{
    AuthAction, AuthContext, Authorizer, Conn, MEMORY, TransactionMode, UpdateAction,
    default_open_flags,
};
pub use params::Binding;
pub use statement::StatementSet;
