use sqlx::PgPool;

/// Runs storage queries against the Postgres pool.
///
/// Each query is a plain struct; `DatabaseProcessor` implements
/// [`kanau::processor::Processor`] for it next to the entity it reads or
/// writes.
#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}

impl DatabaseProcessor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
