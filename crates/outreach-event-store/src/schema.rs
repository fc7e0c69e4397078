//! Event store database schema.
//!
//! Mirrors `migrations/`; kept as a constant so a fresh database can be
//! bootstrapped without the migration runner.

/// SQL to create the events table.
pub const CREATE_EVENTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS domain_events (
    event_id        UUID PRIMARY KEY,
    aggregate_id    UUID NOT NULL,
    event_type      VARCHAR(255) NOT NULL,
    payload         JSONB NOT NULL,
    sequence_number BIGINT NOT NULL,
    correlation_id  UUID NOT NULL,
    causation_id    UUID NOT NULL,
    occurred_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    stored_at       BIGSERIAL NOT NULL,
    UNIQUE (aggregate_id, sequence_number)
);

CREATE INDEX IF NOT EXISTS idx_domain_events_aggregate_id
    ON domain_events (aggregate_id, sequence_number);

CREATE INDEX IF NOT EXISTS idx_domain_events_event_type
    ON domain_events (event_type, stored_at);
";

/// Postgres SQLSTATE for unique constraint violations.
pub(crate) const UNIQUE_VIOLATION: &str = "23505";

#[cfg(test)]
mod tests {
    use super::*;

    const MIGRATION: &str =
        include_str!("../../../migrations/20260101000000_create_domain_events.sql");

    #[test]
    fn test_create_events_table_matches_migration() {
        let normalize = |sql: &str| sql.split_whitespace().collect::<Vec<_>>().join(" ");

        assert_eq!(normalize(CREATE_EVENTS_TABLE), normalize(MIGRATION));
    }

    #[test]
    fn test_create_events_table_enforces_stream_uniqueness() {
        assert!(CREATE_EVENTS_TABLE.contains("UNIQUE (aggregate_id, sequence_number)"));
    }
}
