//! Initial database migration.
//!
//! Creates the transaction enums, the accounts and transactions tables and
//! the indexes backing claims, balances and correlation-key lookups.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(ENUMS_SQL).await?;
        db.execute_unprepared(ACCOUNTS_SQL).await?;
        db.execute_unprepared(TRANSACTIONS_SQL).await?;
        db.execute_unprepared(INDEXES_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

const ENUMS_SQL: &str = r"
CREATE TYPE billing_transaction_status AS ENUM (
    'pending',
    'processing',
    'success',
    'canceled',
    'failed'
);

CREATE TYPE billing_transaction_kind AS ENUM (
    'payment',
    'usage_debit',
    'deposit'
);
";

const ACCOUNTS_SQL: &str = r"
CREATE TABLE billing_accounts (
    id              UUID PRIMARY KEY,
    user_id         VARCHAR(255) NOT NULL,
    email           VARCHAR(255) NOT NULL DEFAULT '',
    customer_ref    VARCHAR(255),
    balance         BIGINT,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ,

    CONSTRAINT uq_billing_accounts_user_id UNIQUE (user_id)
);
";

// from/to carry no foreign key: the bank counterparty is the nil UUID and has no row.
const TRANSACTIONS_SQL: &str = r"
CREATE TABLE billing_transactions (
    id                      UUID PRIMARY KEY,
    kind                    billing_transaction_kind NOT NULL,
    from_account_id         UUID NOT NULL,
    to_account_id           UUID NOT NULL,
    amount                  BIGINT NOT NULL,
    status                  billing_transaction_status NOT NULL DEFAULT 'pending',

    payment_intent_id       VARCHAR(255),
    payment_intent_secret   VARCHAR(255),
    payment_status          VARCHAR(64),
    checkout_session_id     VARCHAR(255),

    stream_id               VARCHAR(255),
    stream_name             VARCHAR(255),
    stream_contract_address VARCHAR(255),
    stream_is_live          BOOLEAN NOT NULL DEFAULT FALSE,
    profile_id              VARCHAR(255),
    profile_name            VARCHAR(255),
    profile_cost            NUMERIC(20, 8),
    task_id                 VARCHAR(255),
    chunk_num               BIGINT,
    duration_secs           BIGINT,
    price                   NUMERIC(20, 8),

    created_at              TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    checked_at              TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    is_locked               BOOLEAN NOT NULL DEFAULT FALSE,

    CONSTRAINT chk_billing_transactions_amount CHECK (amount >= 0)
);
";

const INDEXES_SQL: &str = r"
-- Claim order for the reconciler
CREATE INDEX idx_billing_transactions_claim
    ON billing_transactions (checked_at)
    WHERE status = 'processing' AND is_locked = FALSE AND payment_intent_id IS NOT NULL;

CREATE INDEX idx_billing_transactions_locked
    ON billing_transactions (checked_at)
    WHERE is_locked = TRUE;

CREATE INDEX idx_billing_transactions_from ON billing_transactions (from_account_id, status);
CREATE INDEX idx_billing_transactions_to ON billing_transactions (to_account_id, status);

CREATE INDEX idx_billing_transactions_payment_intent
    ON billing_transactions (payment_intent_id)
    WHERE payment_intent_id IS NOT NULL;

CREATE INDEX idx_billing_transactions_checkout_session
    ON billing_transactions (checkout_session_id)
    WHERE checkout_session_id IS NOT NULL;

-- One usage debit per stream chunk
CREATE UNIQUE INDEX uq_billing_transactions_stream_chunk
    ON billing_transactions (stream_contract_address, chunk_num)
    WHERE stream_contract_address IS NOT NULL;
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS billing_transactions CASCADE;
DROP TABLE IF EXISTS billing_accounts CASCADE;
DROP TYPE IF EXISTS billing_transaction_kind;
DROP TYPE IF EXISTS billing_transaction_status;
";
