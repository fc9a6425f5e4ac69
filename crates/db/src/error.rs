/// Errors raised by storage adapters.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A uniqueness constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A referenced row (such as a job's type) does not exist.
    #[error("Missing reference: {0}")]
    MissingReference(String),

    /// A stored row could not be mapped back onto a domain model.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Map a sqlx error, turning PostgreSQL unique violations (23505) on
    /// `uq_` constraints into [`StoreError::Conflict`] and foreign key
    /// violations (23503) on `fk_` constraints into
    /// [`StoreError::MissingReference`].
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or("unknown");
            match db_err.code().as_deref() {
                Some("23505") if constraint.starts_with("uq_") => {
                    return StoreError::Conflict(format!(
                        "Duplicate value violates unique constraint: {constraint}"
                    ));
                }
                Some("23503") if constraint.starts_with("fk_") => {
                    return StoreError::MissingReference(format!(
                        "Referenced row does not exist: {constraint}"
                    ));
                }
                _ => {}
            }
        }
        StoreError::Database(err)
    }

    /// Whether `err` is a PostgreSQL foreign key violation.
    pub(crate) fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
        matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23503"))
    }
}
