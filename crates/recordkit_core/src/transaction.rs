//! Transaction state machine: `INACTIVE` → `ACTIVE` → `COMMITTED`/`ROLLED_BACK`,
//! with nested transactions modeled as savepoints rather than a second state.
//!
//! This module is deliberately I/O-free. `begin`/`commit`/`rollback` mutate
//! the in-memory state and hand back the SQL text the caller must run; if
//! that statement fails, the caller restores the pre-transition
//! [`TransactionSnapshot`] rather than this module attempting the driver call
//! itself. Keeping the state machine pure is what makes it testable without a
//! live connection.

use crate::dialect::SqlDialect;
use crate::error::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Inactive,
    Active,
    Committed,
    RolledBack,
}

/// Standard SQL isolation levels. Mapping to a dialect-specific token is the
/// dialect's job ([`SqlDialect::isolation_level_token`]); a level with no
/// mapping on a given backend surfaces as [`DbError::IsolationLevel`] rather
/// than silently falling back to a different level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

#[derive(Debug, Clone)]
pub struct TransactionSnapshot {
    state: TransactionState,
    depth: u32,
    savepoints: Vec<String>,
}

/// The SQL to execute for a `begin`, together with the savepoint name it
/// established, if this was a nested begin rather than the outermost one.
#[derive(Debug, Clone)]
pub struct BeginStatement {
    pub sql: String,
    pub savepoint_name: Option<String>,
}

/// Per-connection transaction state. One instance belongs to exactly one
/// [`crate::backend::StorageBackend`]; it is not meant to be shared across
/// connections, so callers needing interior mutability behind a shared
/// reference wrap it in a `Mutex` themselves (as the backend trait does).
#[derive(Debug)]
pub struct TransactionManager {
    state: TransactionState,
    depth: u32,
    savepoints: Vec<String>,
    isolation_level: Option<IsolationLevel>,
    next_savepoint_id: u32,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            state: TransactionState::Inactive,
            depth: 0,
            savepoints: Vec::new(),
            isolation_level: None,
            next_savepoint_id: 0,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_active(&self) -> bool {
        self.depth > 0
    }

    pub fn active_savepoints(&self) -> &[String] {
        &self.savepoints
    }

    pub fn isolation_level(&self) -> Option<IsolationLevel> {
        self.isolation_level
    }

    /// Configurable only while `INACTIVE`; a level set mid-transaction would
    /// have no well-defined effect on work already in flight.
    pub fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<(), DbError> {
        if self.state != TransactionState::Inactive {
            return Err(DbError::transaction("isolation level can only be set while inactive"));
        }
        self.isolation_level = Some(level);
        Ok(())
    }

    pub fn snapshot(&self) -> TransactionSnapshot {
        TransactionSnapshot {
            state: self.state,
            depth: self.depth,
            savepoints: self.savepoints.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: TransactionSnapshot) {
        self.state = snapshot.state;
        self.depth = snapshot.depth;
        self.savepoints = snapshot.savepoints;
    }

    fn next_savepoint_name(&mut self) -> String {
        self.next_savepoint_id += 1;
        format!("sp_{}", self.next_savepoint_id)
    }

    /// Begin a transaction (depth 0 → 1) or, if one is already open, push a
    /// savepoint (depth N → N+1). Isolation level only applies to the
    /// outermost begin.
    pub fn begin(&mut self, dialect: &dyn SqlDialect) -> Result<BeginStatement, DbError> {
        if self.depth == 0 {
            let isolation_sql = match self.isolation_level {
                Some(level) => format!(" {}", dialect.isolation_level_token(level)?),
                None => String::new(),
            };
            self.state = TransactionState::Active;
            self.depth = 1;
            Ok(BeginStatement {
                sql: format!("BEGIN{isolation_sql}"),
                savepoint_name: None,
            })
        } else {
            let name = self.next_savepoint_name();
            self.savepoints.push(name.clone());
            self.depth += 1;
            Ok(BeginStatement {
                sql: format!("SAVEPOINT {name}"),
                savepoint_name: Some(name),
            })
        }
    }

    /// Commit the innermost level: releases the topmost savepoint while
    /// nested, commits outright at depth 1.
    pub fn commit(&mut self) -> Result<String, DbError> {
        match self.depth {
            0 => Err(DbError::transaction("cannot commit: no active transaction")),
            1 => {
                self.state = TransactionState::Committed;
                self.depth = 0;
                self.savepoints.clear();
                Ok("COMMIT".to_string())
            }
            _ => {
                let name = self
                    .savepoints
                    .pop()
                    .ok_or_else(|| DbError::transaction("savepoint stack underflow"))?;
                self.depth -= 1;
                Ok(format!("RELEASE SAVEPOINT {name}"))
            }
        }
    }

    /// Roll back the innermost level: rolls back to the topmost savepoint
    /// while nested, rolls back the whole transaction at depth 1.
    pub fn rollback(&mut self) -> Result<String, DbError> {
        match self.depth {
            0 => Err(DbError::transaction("cannot roll back: no active transaction")),
            1 => {
                self.state = TransactionState::RolledBack;
                self.depth = 0;
                self.savepoints.clear();
                Ok("ROLLBACK".to_string())
            }
            _ => {
                let name = self
                    .savepoints
                    .pop()
                    .ok_or_else(|| DbError::transaction("savepoint stack underflow"))?;
                self.depth -= 1;
                Ok(format!("ROLLBACK TO SAVEPOINT {name}"))
            }
        }
    }

    /// Establish an explicit, named savepoint without changing the
    /// begin/commit nesting depth's implicit naming.
    pub fn savepoint(&mut self, name: Option<String>) -> Result<String, DbError> {
        if self.state != TransactionState::Active {
            return Err(DbError::transaction("cannot create a savepoint outside an active transaction"));
        }
        let name = name.unwrap_or_else(|| self.next_savepoint_name());
        self.savepoints.push(name.clone());
        self.depth += 1;
        Ok(name)
    }

    /// Release a named savepoint, discarding it and every savepoint nested
    /// after it (they are subsumed into the parent once released).
    pub fn release(&mut self, name: &str) -> Result<(), DbError> {
        if self.state != TransactionState::Active {
            return Err(DbError::transaction("cannot release a savepoint outside an active transaction"));
        }
        let pos = self
            .savepoints
            .iter()
            .rposition(|n| n == name)
            .ok_or_else(|| DbError::transaction(format!("unknown savepoint '{name}'")))?;
        self.savepoints.truncate(pos);
        self.depth = 1 + self.savepoints.len() as u32;
        Ok(())
    }

    /// Roll back to a named savepoint, keeping it (and everything before it)
    /// on the stack — the caller remains inside that savepoint's scope and
    /// may retry work within it.
    pub fn rollback_to(&mut self, name: &str) -> Result<(), DbError> {
        if self.state != TransactionState::Active {
            return Err(DbError::transaction("cannot roll back to a savepoint outside an active transaction"));
        }
        let pos = self
            .savepoints
            .iter()
            .rposition(|n| n == name)
            .ok_or_else(|| DbError::transaction(format!("unknown savepoint '{name}'")))?;
        self.savepoints.truncate(pos + 1);
        self.depth = 1 + self.savepoints.len() as u32;
        Ok(())
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}
