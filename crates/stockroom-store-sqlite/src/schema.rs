//! SQL schema for the Stockroom SQLite store.
//!
//! Executed on every connection open. Quantities are stored as decimal
//! strings, timestamps as RFC 3339 UTC strings with microsecond precision.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS articles (
    article_id    TEXT PRIMARY KEY,
    reference     TEXT NOT NULL UNIQUE,
    name          TEXT NOT NULL,
    description   TEXT NOT NULL DEFAULT '',
    unit          TEXT NOT NULL,           -- 'PCS' | 'M' | 'KG' | 'L' | 'BOX' | 'ROLL' | 'SET'
    category      TEXT NOT NULL DEFAULT '',
    manufacturer  TEXT NOT NULL DEFAULT '',
    model_number  TEXT NOT NULL DEFAULT '',
    safety_stock  TEXT NOT NULL DEFAULT '0',
    cost_price    TEXT,
    is_active     INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS articles_reference_immutable
BEFORE UPDATE OF reference ON articles
WHEN NEW.reference IS NOT OLD.reference
BEGIN
    SELECT RAISE(ABORT, 'article reference is immutable');
END;

-- One row per (technician, article), created on first touch.
CREATE TABLE IF NOT EXISTS stock_tech (
    technician_id TEXT NOT NULL,
    article_id    TEXT NOT NULL REFERENCES articles(article_id),
    balance       TEXT NOT NULL,
    reserved_qty  TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    PRIMARY KEY (technician_id, article_id)
);

-- Append-only. Commit order is rowid order.
CREATE TABLE IF NOT EXISTS stock_movements (
    movement_id        TEXT NOT NULL UNIQUE,
    technician_id      TEXT NOT NULL,
    article_id         TEXT NOT NULL REFERENCES articles(article_id),
    delta              TEXT NOT NULL,
    reason             TEXT NOT NULL,
    actor_id           TEXT NOT NULL,
    recorded_at        TEXT NOT NULL,
    balance_after      TEXT NOT NULL,
    linked_movement_id TEXT,
    demand_id          TEXT,
    reservation_id     TEXT,
    location_text      TEXT NOT NULL DEFAULT '',
    notes              TEXT NOT NULL DEFAULT ''
);

CREATE TRIGGER IF NOT EXISTS stock_movements_no_update
BEFORE UPDATE ON stock_movements
BEGIN
    SELECT RAISE(ABORT, 'stock_movements is append-only');
END;

CREATE TRIGGER IF NOT EXISTS stock_movements_no_delete
BEFORE DELETE ON stock_movements
BEGIN
    SELECT RAISE(ABORT, 'stock_movements is append-only');
END;

CREATE TABLE IF NOT EXISTS thresholds (
    technician_id TEXT NOT NULL,
    article_id    TEXT NOT NULL REFERENCES articles(article_id),
    min_qty       TEXT NOT NULL,
    is_active     INTEGER NOT NULL DEFAULT 1,
    last_alert_at TEXT,
    PRIMARY KEY (technician_id, article_id)
);

CREATE TABLE IF NOT EXISTS threshold_alerts (
    alert_id        TEXT PRIMARY KEY,
    technician_id   TEXT NOT NULL,
    article_id      TEXT NOT NULL,
    balance         TEXT NOT NULL,
    min_qty         TEXT NOT NULL,
    raised_at       TEXT NOT NULL,
    acknowledged_at TEXT,
    acknowledged_by TEXT
);

CREATE TABLE IF NOT EXISTS carts (
    cart_id       TEXT PRIMARY KEY,
    technician_id TEXT NOT NULL,
    status        TEXT NOT NULL,           -- 'open' | 'submitted'
    demand_id     TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

-- At most one open cart per technician.
CREATE UNIQUE INDEX IF NOT EXISTS carts_one_open_idx
    ON carts(technician_id) WHERE status = 'open';

CREATE TABLE IF NOT EXISTS cart_lines (
    line_id    TEXT PRIMARY KEY,
    cart_id    TEXT NOT NULL REFERENCES carts(cart_id),
    article_id TEXT NOT NULL REFERENCES articles(article_id),
    quantity   TEXT NOT NULL,
    notes      TEXT NOT NULL DEFAULT '',
    UNIQUE (cart_id, article_id)
);

CREATE TABLE IF NOT EXISTS demands (
    demand_id       TEXT PRIMARY KEY,
    technician_id   TEXT NOT NULL,
    status          TEXT NOT NULL,
    notes           TEXT NOT NULL DEFAULT '',
    refusal_reason  TEXT,
    approval_notes  TEXT,
    approved_by     TEXT,
    approved_at     TEXT,
    prepared_by     TEXT,
    prepared_at     TEXT,
    handover_method TEXT,
    handover_data   TEXT,                  -- JSON; never holds the credential
    handed_over_at  TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS demand_lines (
    line_id       TEXT PRIMARY KEY,
    demand_id     TEXT NOT NULL REFERENCES demands(demand_id),
    article_id    TEXT NOT NULL REFERENCES articles(article_id),
    requested_qty TEXT NOT NULL,
    approved_qty  TEXT NOT NULL,
    prepared_qty  TEXT NOT NULL DEFAULT '0',
    notes         TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS handover_pins (
    pin_id     TEXT PRIMARY KEY,
    demand_id  TEXT NOT NULL REFERENCES demands(demand_id),
    pin_hash   TEXT NOT NULL,              -- argon2 PHC string
    expires_at TEXT NOT NULL,
    used_at    TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS reservations (
    reservation_id TEXT PRIMARY KEY,
    technician_id  TEXT NOT NULL,
    article_id     TEXT NOT NULL REFERENCES articles(article_id),
    qty_reserved   TEXT NOT NULL,
    scheduled_for  TEXT,
    status         TEXT NOT NULL,
    notes          TEXT NOT NULL DEFAULT '',
    created_by     TEXT NOT NULL,
    approved_by    TEXT,
    approved_at    TEXT,
    cancelled_at   TEXT,
    consumed_at    TEXT,
    created_at     TEXT NOT NULL
);

-- Append-only hash chain. `seq` is the chain position.
CREATE TABLE IF NOT EXISTS audit_events (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id    TEXT NOT NULL UNIQUE,
    prev_hash   TEXT NOT NULL,
    this_hash   TEXT NOT NULL UNIQUE,
    actor_id    TEXT NOT NULL,
    event_type  TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id   TEXT NOT NULL,
    payload     TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE TRIGGER IF NOT EXISTS audit_events_no_update
BEFORE UPDATE ON audit_events
BEGIN
    SELECT RAISE(ABORT, 'audit_events is append-only');
END;

CREATE TRIGGER IF NOT EXISTS audit_events_no_delete
BEFORE DELETE ON audit_events
BEGIN
    SELECT RAISE(ABORT, 'audit_events is append-only');
END;

CREATE INDEX IF NOT EXISTS movements_pair_idx    ON stock_movements(technician_id, article_id);
CREATE INDEX IF NOT EXISTS movements_demand_idx  ON stock_movements(demand_id);
CREATE INDEX IF NOT EXISTS cart_lines_cart_idx   ON cart_lines(cart_id);
CREATE INDEX IF NOT EXISTS demands_tech_idx      ON demands(technician_id, status);
CREATE INDEX IF NOT EXISTS demand_lines_idx      ON demand_lines(demand_id);
CREATE INDEX IF NOT EXISTS pins_demand_idx       ON handover_pins(demand_id);
CREATE INDEX IF NOT EXISTS reservations_tech_idx ON reservations(technician_id);
CREATE INDEX IF NOT EXISTS audit_entity_idx      ON audit_events(entity_type, entity_id);

PRAGMA user_version = 1;
";
