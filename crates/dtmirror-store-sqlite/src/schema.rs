//! SQL schema for the mirror database.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Timestamps are fixed-width RFC 3339 UTC strings, so max(time) and
-- ORDER BY time compare chronologically.
CREATE TABLE IF NOT EXISTS person (
    id              INTEGER PRIMARY KEY,
    name            TEXT    NOT NULL CHECK (name <> ''),
    name_from_draft TEXT,
    ascii           TEXT    NOT NULL,
    ascii_short     TEXT,
    user            TEXT,
    time            TEXT    NOT NULL,
    photo           TEXT,
    photo_thumb     TEXT,
    biography       TEXT    NOT NULL,
    consent         INTEGER
);

CREATE TABLE IF NOT EXISTS alias (
    id     INTEGER PRIMARY KEY,
    person INTEGER NOT NULL REFERENCES person(id),
    name   TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS email (
    address    TEXT    PRIMARY KEY CHECK (address <> ''),
    person     INTEGER NOT NULL REFERENCES person(id),
    time       TEXT    NOT NULL,
    origin     TEXT    NOT NULL,
    is_primary INTEGER NOT NULL,
    active     INTEGER NOT NULL
);

-- History rows are keyed by the remote history_id and never change once
-- written; re-delivery rewrites identical values.
CREATE TABLE IF NOT EXISTS historical_email (
    history_id            INTEGER PRIMARY KEY,
    address               TEXT    NOT NULL,
    person                INTEGER NOT NULL REFERENCES person(id),
    time                  TEXT    NOT NULL,
    origin                TEXT    NOT NULL,
    is_primary            INTEGER NOT NULL,
    active                INTEGER NOT NULL,
    history_type          TEXT    NOT NULL,   -- 'created' | 'changed' | 'deleted'
    history_change_reason TEXT,
    history_user          TEXT,
    history_date          TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS historical_person (
    history_id            INTEGER PRIMARY KEY,
    id                    INTEGER NOT NULL REFERENCES person(id),
    name                  TEXT    NOT NULL,
    name_from_draft       TEXT,
    ascii                 TEXT    NOT NULL,
    ascii_short           TEXT,
    user                  TEXT,
    time                  TEXT    NOT NULL,
    photo                 TEXT,
    photo_thumb           TEXT,
    biography             TEXT    NOT NULL,
    consent               INTEGER,
    history_type          TEXT    NOT NULL,
    history_change_reason TEXT,
    history_user          TEXT,
    history_date          TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS person_events (
    id     INTEGER PRIMARY KEY,
    person INTEGER NOT NULL REFERENCES person(id),
    time   TEXT    NOT NULL,
    type   TEXT    NOT NULL,
    \"desc\" TEXT    NOT NULL
);

-- ad is not a foreign key: documents may be mirrored without (or before)
-- the people they mention. The group table is not mirrored at all.
CREATE TABLE IF NOT EXISTS document (
    name     TEXT    PRIMARY KEY,
    id       INTEGER NOT NULL UNIQUE,
    title    TEXT    NOT NULL,
    abstract TEXT,
    rev      TEXT    NOT NULL,
    pages    INTEGER,
    time     TEXT    NOT NULL,
    expires  TEXT,
    ad       INTEGER,
    shepherd TEXT,
    group_id INTEGER
);

CREATE INDEX IF NOT EXISTS person_time_idx             ON person(time);
CREATE INDEX IF NOT EXISTS alias_person_idx            ON alias(person);
CREATE INDEX IF NOT EXISTS email_person_idx            ON email(person);
CREATE INDEX IF NOT EXISTS historical_email_person_idx ON historical_email(person);
CREATE INDEX IF NOT EXISTS historical_person_id_idx    ON historical_person(id);
CREATE INDEX IF NOT EXISTS person_events_person_idx    ON person_events(person);

PRAGMA user_version = 1;
";
