//! SQLite store for all durable pipeline state.
//!
//! Tokens, seeds, wallets and trades grow monotonically; positions and
//! 30-day stats are derived projections that may be rebuilt at any time;
//! watchlist rows are mutable working state; alerts are an append-only
//! ledger keyed by a content-hash dedup key.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

use crate::types::{
    Lot, SeedToken, Token, Trade, TradeSide, Wallet, WalletStats30D, WatchStatus, WatchlistEntry,
};

/// Outcome of an idempotent trade insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeInsert {
    Inserted,
    /// Same tx_hash, same body: the expected replay case.
    Duplicate,
    /// Same tx_hash but a different body: invariant violation. The stored
    /// row wins; the offending record is quarantined by the caller.
    Conflicting,
}

/// One emitted alert, as read back for outcome evaluation.
#[derive(Debug, Clone)]
pub struct AlertRow {
    pub id: i64,
    pub ts: i64,
    pub kind: String,
    pub chain_id: String,
    pub token_address: String,
    pub wallets: Vec<String>,
    pub price_usd: Option<f64>,
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn new<P: AsRef<Path>>(path: P, wal_mode: bool) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create database directory")?;
        }

        let conn = Connection::open(path).context("Failed to open database connection")?;

        if wal_mode {
            conn.execute_batch("PRAGMA journal_mode=WAL;")
                .context("Failed to enable WAL mode")?;
        }

        let mut db = Self { conn };
        db.initialize_schema()?;

        info!("✅ Database initialized");
        Ok(db)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let mut db = Self { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    fn initialize_schema(&mut self) -> Result<()> {
        self.conn
            .execute_batch(
                r#"
            CREATE TABLE IF NOT EXISTS tokens (
                chain_id TEXT NOT NULL,
                token_address TEXT NOT NULL,
                symbol TEXT,
                name TEXT,
                last_price_usd REAL,
                liquidity_usd REAL,
                vol_24h_usd REAL,
                buy_tax_pct REAL,
                sell_tax_pct REAL,
                is_honeypot INTEGER,
                first_seen_at INTEGER NOT NULL,
                PRIMARY KEY(chain_id, token_address)
            );

            CREATE TABLE IF NOT EXISTS seed_tokens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chain_id TEXT NOT NULL,
                token_address TEXT NOT NULL,
                source TEXT NOT NULL,
                snapshot_ts INTEGER NOT NULL,
                rank INTEGER,
                vol_24h_usd REAL
            );

            CREATE TABLE IF NOT EXISTS wallets (
                chain_id TEXT NOT NULL,
                address TEXT NOT NULL,
                first_seen_at INTEGER NOT NULL,
                labels_json TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY(chain_id, address)
            );

            CREATE TABLE IF NOT EXISTS trades (
                tx_hash TEXT PRIMARY KEY,
                ts INTEGER NOT NULL,
                chain_id TEXT NOT NULL,
                wallet_address TEXT NOT NULL,
                token_address TEXT NOT NULL,
                side TEXT CHECK(side IN ('buy', 'sell')) NOT NULL,
                qty_token REAL NOT NULL CHECK(qty_token >= 0),
                price_usd REAL NOT NULL,
                usd_value REAL NOT NULL,
                venue TEXT
            );

            CREATE TABLE IF NOT EXISTS positions (
                chain_id TEXT NOT NULL,
                wallet_address TEXT NOT NULL,
                token_address TEXT NOT NULL,
                lots_json TEXT NOT NULL,
                realized_pnl_usd REAL NOT NULL DEFAULT 0.0,
                unrealized_pnl_usd REAL NOT NULL DEFAULT 0.0,
                last_price_usd REAL,
                rebuilt_from_ts INTEGER NOT NULL,
                last_update INTEGER NOT NULL,
                PRIMARY KEY(chain_id, wallet_address, token_address)
            );

            CREATE TABLE IF NOT EXISTS wallet_stats_30d (
                wallet_address TEXT NOT NULL,
                chain_id TEXT NOT NULL,
                trades_count INTEGER NOT NULL DEFAULT 0,
                realized_pnl_usd REAL NOT NULL DEFAULT 0.0,
                unrealized_pnl_usd REAL NOT NULL DEFAULT 0.0,
                best_trade_multiple REAL,
                earlyscore_median REAL,
                max_drawdown_pct REAL,
                last_update INTEGER NOT NULL,
                PRIMARY KEY(wallet_address, chain_id)
            );

            CREATE TABLE IF NOT EXISTS watchlist (
                wallet_address TEXT NOT NULL,
                chain_id TEXT NOT NULL,
                composite_score REAL NOT NULL DEFAULT 0.0,
                added_at INTEGER NOT NULL,
                last_evaluated_at INTEGER NOT NULL,
                status TEXT CHECK(status IN ('active', 'removed', 'pending')) NOT NULL,
                PRIMARY KEY(wallet_address, chain_id)
            );

            CREATE TABLE IF NOT EXISTS custom_watchlist (
                address TEXT NOT NULL,
                chain_id TEXT NOT NULL,
                label TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                added_at INTEGER NOT NULL,
                PRIMARY KEY(address, chain_id)
            );

            CREATE TABLE IF NOT EXISTS alerts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts INTEGER NOT NULL,
                kind TEXT CHECK(kind IN ('buy_confluence', 'sell_confluence')) NOT NULL,
                chain_id TEXT NOT NULL,
                token_address TEXT NOT NULL,
                wallets_json TEXT NOT NULL,
                dedup_key TEXT NOT NULL UNIQUE,
                window_ms INTEGER NOT NULL,
                price_usd REAL,
                weights_json TEXT,
                payload_json TEXT
            );

            CREATE TABLE IF NOT EXISTS monitor_cursors (
                chain_id TEXT NOT NULL,
                wallet_address TEXT NOT NULL,
                last_seen_tx TEXT NOT NULL,
                PRIMARY KEY(chain_id, wallet_address)
            );

            CREATE INDEX IF NOT EXISTS idx_trades_wallet_ts ON trades(wallet_address, ts DESC);
            CREATE INDEX IF NOT EXISTS idx_trades_token_ts ON trades(token_address, ts DESC);
            CREATE INDEX IF NOT EXISTS idx_trades_chain_ts ON trades(chain_id, ts DESC);
            CREATE INDEX IF NOT EXISTS idx_seed_tokens_snapshot ON seed_tokens(snapshot_ts);
            CREATE INDEX IF NOT EXISTS idx_seed_tokens_token ON seed_tokens(chain_id, token_address);
            CREATE INDEX IF NOT EXISTS idx_alerts_ts ON alerts(ts);
            CREATE INDEX IF NOT EXISTS idx_watchlist_status ON watchlist(chain_id, status);
            "#,
            )
            .context("Failed to initialize database schema")?;

        debug!("Database schema ready");
        Ok(())
    }

    // ========================================================================
    // TOKENS
    // ========================================================================

    /// Insert or refresh a token. Market fields are overwritten when the new
    /// snapshot carries them; safety fields and first_seen are preserved.
    pub fn upsert_token(&mut self, token: &Token) -> Result<()> {
        self.conn
            .execute(
                r#"
            INSERT INTO tokens (
                chain_id, token_address, symbol, name, last_price_usd,
                liquidity_usd, vol_24h_usd, buy_tax_pct, sell_tax_pct,
                is_honeypot, first_seen_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(chain_id, token_address) DO UPDATE SET
                symbol = COALESCE(excluded.symbol, symbol),
                name = COALESCE(excluded.name, name),
                last_price_usd = COALESCE(excluded.last_price_usd, last_price_usd),
                liquidity_usd = COALESCE(excluded.liquidity_usd, liquidity_usd),
                vol_24h_usd = COALESCE(excluded.vol_24h_usd, vol_24h_usd)
            "#,
                params![
                    token.chain_id,
                    token.token_address,
                    token.symbol,
                    token.name,
                    token.last_price_usd,
                    token.liquidity_usd,
                    token.vol_24h_usd,
                    token.buy_tax_pct,
                    token.sell_tax_pct,
                    token.is_honeypot.map(|b| b as i32),
                    token.first_seen_at,
                ],
            )
            .context("Failed to upsert token")?;
        Ok(())
    }

    pub fn update_token_safety(
        &mut self,
        chain_id: &str,
        token_address: &str,
        buy_tax_pct: f64,
        sell_tax_pct: f64,
        is_honeypot: bool,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE tokens SET buy_tax_pct = ?1, sell_tax_pct = ?2, is_honeypot = ?3
                 WHERE chain_id = ?4 AND token_address = ?5",
                params![buy_tax_pct, sell_tax_pct, is_honeypot as i32, chain_id, token_address],
            )
            .context("Failed to update token safety")?;
        Ok(())
    }

    pub fn update_token_price(
        &mut self,
        chain_id: &str,
        token_address: &str,
        price_usd: f64,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE tokens SET last_price_usd = ?1 WHERE chain_id = ?2 AND token_address = ?3",
                params![price_usd, chain_id, token_address],
            )
            .context("Failed to update token price")?;
        Ok(())
    }

    pub fn get_token(&self, chain_id: &str, token_address: &str) -> Result<Option<Token>> {
        let token = self
            .conn
            .query_row(
                "SELECT chain_id, token_address, symbol, name, last_price_usd, liquidity_usd,
                        vol_24h_usd, buy_tax_pct, sell_tax_pct, is_honeypot, first_seen_at
                 FROM tokens WHERE chain_id = ?1 AND token_address = ?2",
                params![chain_id, token_address],
                |row| {
                    Ok(Token {
                        chain_id: row.get(0)?,
                        token_address: row.get(1)?,
                        symbol: row.get(2)?,
                        name: row.get(3)?,
                        last_price_usd: row.get(4)?,
                        liquidity_usd: row.get(5)?,
                        vol_24h_usd: row.get(6)?,
                        buy_tax_pct: row.get(7)?,
                        sell_tax_pct: row.get(8)?,
                        is_honeypot: row.get::<_, Option<i32>>(9)?.map(|v| v != 0),
                        first_seen_at: row.get(10)?,
                    })
                },
            )
            .optional()?;
        Ok(token)
    }

    // ========================================================================
    // SEED TOKENS
    // ========================================================================

    pub fn insert_seed_token(&mut self, seed: &SeedToken) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO seed_tokens (chain_id, token_address, source, snapshot_ts, rank, vol_24h_usd)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    seed.chain_id,
                    seed.token_address,
                    seed.source,
                    seed.snapshot_ts,
                    seed.rank,
                    seed.vol_24h_usd,
                ],
            )
            .context("Failed to insert seed token")?;
        Ok(())
    }

    /// Distinct `(chain, token)` pairs whose latest snapshot is within the
    /// lookback window; the discovery targets.
    pub fn recent_seed_targets(&self, since: i64) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT chain_id, token_address, MAX(snapshot_ts) AS latest
             FROM seed_tokens
             GROUP BY chain_id, token_address
             HAVING latest >= ?1
             ORDER BY latest DESC",
        )?;
        let rows = stmt
            .query_map(params![since], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ========================================================================
    // WALLETS
    // ========================================================================

    /// Returns true when the wallet was newly created.
    pub fn upsert_wallet(&mut self, chain_id: &str, address: &str, now: i64) -> Result<bool> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO wallets (chain_id, address, first_seen_at) VALUES (?1, ?2, ?3)",
            params![chain_id, address, now],
        )?;
        Ok(changed > 0)
    }

    pub fn get_wallet(&self, chain_id: &str, address: &str) -> Result<Option<Wallet>> {
        let wallet = self
            .conn
            .query_row(
                "SELECT chain_id, address, first_seen_at, labels_json
                 FROM wallets WHERE chain_id = ?1 AND address = ?2",
                params![chain_id, address],
                |row| {
                    let labels_json: String = row.get(3)?;
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?, labels_json))
                },
            )
            .optional()?;

        Ok(wallet.map(|(chain_id, address, first_seen_at, labels_json)| Wallet {
            chain_id,
            address,
            first_seen_at,
            labels: serde_json::from_str(&labels_json).unwrap_or_default(),
        }))
    }

    /// Merge a label into the wallet's label set. Human-applied labels
    /// survive because merging never removes.
    pub fn add_wallet_label(&mut self, chain_id: &str, address: &str, label: &str) -> Result<()> {
        let Some(wallet) = self.get_wallet(chain_id, address)? else {
            return Ok(());
        };
        if wallet.labels.iter().any(|l| l == label) {
            return Ok(());
        }
        let mut labels = wallet.labels;
        labels.push(label.to_string());
        self.conn.execute(
            "UPDATE wallets SET labels_json = ?1 WHERE chain_id = ?2 AND address = ?3",
            params![serde_json::to_string(&labels)?, chain_id, address],
        )?;
        Ok(())
    }

    pub fn remove_wallet_label(&mut self, chain_id: &str, address: &str, label: &str) -> Result<()> {
        let Some(wallet) = self.get_wallet(chain_id, address)? else {
            return Ok(());
        };
        let labels: Vec<String> = wallet.labels.into_iter().filter(|l| l != label).collect();
        self.conn.execute(
            "UPDATE wallets SET labels_json = ?1 WHERE chain_id = ?2 AND address = ?3",
            params![serde_json::to_string(&labels)?, chain_id, address],
        )?;
        Ok(())
    }

    // ========================================================================
    // TRADES
    // ========================================================================

    pub fn insert_trade(&mut self, trade: &Trade) -> Result<TradeInsert> {
        let changed = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO trades (
                tx_hash, ts, chain_id, wallet_address, token_address,
                side, qty_token, price_usd, usd_value, venue
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                trade.tx_hash,
                trade.ts,
                trade.chain_id,
                trade.wallet_address,
                trade.token_address,
                trade.side.as_str(),
                trade.qty_token,
                trade.price_usd,
                trade.usd_value,
                trade.venue,
            ],
        )?;

        if changed > 0 {
            return Ok(TradeInsert::Inserted);
        }

        // Existing row: distinguish an idempotent replay from a conflicting
        // body on the same tx_hash.
        let existing: Option<(String, String, String, f64)> = self
            .conn
            .query_row(
                "SELECT wallet_address, token_address, side, qty_token FROM trades WHERE tx_hash = ?1",
                params![trade.tx_hash],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        match existing {
            Some((wallet, token, side, qty))
                if wallet == trade.wallet_address
                    && token == trade.token_address
                    && side == trade.side.as_str()
                    && (qty - trade.qty_token).abs() < 1e-9 =>
            {
                Ok(TradeInsert::Duplicate)
            }
            Some(_) => Ok(TradeInsert::Conflicting),
            None => Ok(TradeInsert::Duplicate),
        }
    }

    /// Wallet trades in `[since, until)`, deterministically ordered for FIFO
    /// processing.
    pub fn trades_for_wallet(
        &self,
        chain_id: &str,
        wallet_address: &str,
        since: i64,
        until: i64,
    ) -> Result<Vec<Trade>> {
        let mut stmt = self.conn.prepare(
            "SELECT tx_hash, ts, chain_id, wallet_address, token_address, side,
                    qty_token, price_usd, usd_value, venue
             FROM trades
             WHERE chain_id = ?1 AND wallet_address = ?2 AND ts >= ?3 AND ts < ?4
             ORDER BY ts ASC, tx_hash ASC",
        )?;
        let trades = stmt
            .query_map(params![chain_id, wallet_address, since, until], row_to_trade)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(trades)
    }

    /// Distinct wallets with at least one trade since the cutoff.
    pub fn wallets_traded_since(&self, since: i64) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT chain_id, wallet_address FROM trades WHERE ts >= ?1",
        )?;
        let rows = stmt
            .query_map(params![since], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn wallet_has_trade_since(
        &self,
        chain_id: &str,
        wallet_address: &str,
        since: i64,
    ) -> Result<bool> {
        let mut stmt = self.conn.prepare(
            "SELECT 1 FROM trades WHERE chain_id = ?1 AND wallet_address = ?2 AND ts >= ?3 LIMIT 1",
        )?;
        Ok(stmt.exists(params![chain_id, wallet_address, since])?)
    }

    /// First-buy timestamp per buyer of a token, ordered earliest first.
    /// Feeds the Being-Early rank component.
    pub fn token_buyer_first_ts(
        &self,
        chain_id: &str,
        token_address: &str,
    ) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT wallet_address, MIN(ts) AS first_buy
             FROM trades
             WHERE chain_id = ?1 AND token_address = ?2 AND side = 'buy'
             GROUP BY wallet_address
             ORDER BY first_buy ASC, wallet_address ASC",
        )?;
        let rows = stmt
            .query_map(params![chain_id, token_address], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Most recent observed trade price for a token; the price enricher's
    /// last fallback.
    pub fn latest_trade_price(&self, chain_id: &str, token_address: &str) -> Result<Option<f64>> {
        let price = self
            .conn
            .query_row(
                "SELECT price_usd FROM trades
                 WHERE chain_id = ?1 AND token_address = ?2 AND price_usd > 0
                 ORDER BY ts DESC, tx_hash DESC LIMIT 1",
                params![chain_id, token_address],
                |row| row.get(0),
            )
            .optional()?;
        Ok(price)
    }

    // ========================================================================
    // POSITIONS (derived projection)
    // ========================================================================

    pub fn upsert_position(
        &mut self,
        chain_id: &str,
        wallet_address: &str,
        token_address: &str,
        lots: &[Lot],
        realized_pnl_usd: f64,
        unrealized_pnl_usd: f64,
        last_price_usd: Option<f64>,
        rebuilt_from_ts: i64,
        now: i64,
    ) -> Result<()> {
        self.conn
            .execute(
                r#"
            INSERT OR REPLACE INTO positions (
                chain_id, wallet_address, token_address, lots_json,
                realized_pnl_usd, unrealized_pnl_usd, last_price_usd,
                rebuilt_from_ts, last_update
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
                params![
                    chain_id,
                    wallet_address,
                    token_address,
                    serde_json::to_string(lots)?,
                    realized_pnl_usd,
                    unrealized_pnl_usd,
                    last_price_usd,
                    rebuilt_from_ts,
                    now,
                ],
            )
            .context("Failed to upsert position")?;
        Ok(())
    }

    pub fn get_position_lots(
        &self,
        chain_id: &str,
        wallet_address: &str,
        token_address: &str,
    ) -> Result<Option<Vec<Lot>>> {
        let lots_json: Option<String> = self
            .conn
            .query_row(
                "SELECT lots_json FROM positions
                 WHERE chain_id = ?1 AND wallet_address = ?2 AND token_address = ?3",
                params![chain_id, wallet_address, token_address],
                |row| row.get(0),
            )
            .optional()?;
        Ok(lots_json.and_then(|j| serde_json::from_str(&j).ok()))
    }

    // ========================================================================
    // WALLET STATS
    // ========================================================================

    pub fn upsert_stats(&mut self, stats: &WalletStats30D) -> Result<()> {
        self.conn
            .execute(
                r#"
            INSERT OR REPLACE INTO wallet_stats_30d (
                wallet_address, chain_id, trades_count, realized_pnl_usd,
                unrealized_pnl_usd, best_trade_multiple, earlyscore_median,
                max_drawdown_pct, last_update
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
                params![
                    stats.wallet_address,
                    stats.chain_id,
                    stats.trades_count,
                    stats.realized_pnl_usd,
                    stats.unrealized_pnl_usd,
                    stats.best_trade_multiple,
                    stats.earlyscore_median,
                    stats.max_drawdown_pct,
                    stats.last_update,
                ],
            )
            .context("Failed to upsert wallet stats")?;
        Ok(())
    }

    pub fn get_stats(&self, chain_id: &str, wallet_address: &str) -> Result<Option<WalletStats30D>> {
        let stats = self
            .conn
            .query_row(
                "SELECT wallet_address, chain_id, trades_count, realized_pnl_usd,
                        unrealized_pnl_usd, best_trade_multiple, earlyscore_median,
                        max_drawdown_pct, last_update
                 FROM wallet_stats_30d WHERE chain_id = ?1 AND wallet_address = ?2",
                params![chain_id, wallet_address],
                row_to_stats,
            )
            .optional()?;
        Ok(stats)
    }

    pub fn stats_for_chain(&self, chain_id: &str) -> Result<Vec<WalletStats30D>> {
        let mut stmt = self.conn.prepare(
            "SELECT wallet_address, chain_id, trades_count, realized_pnl_usd,
                    unrealized_pnl_usd, best_trade_multiple, earlyscore_median,
                    max_drawdown_pct, last_update
             FROM wallet_stats_30d WHERE chain_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![chain_id], row_to_stats)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ========================================================================
    // WATCHLIST
    // ========================================================================

    pub fn upsert_watchlist_entry(&mut self, entry: &WatchlistEntry) -> Result<()> {
        self.conn
            .execute(
                r#"
            INSERT INTO watchlist (
                wallet_address, chain_id, composite_score, added_at,
                last_evaluated_at, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(wallet_address, chain_id) DO UPDATE SET
                composite_score = excluded.composite_score,
                last_evaluated_at = excluded.last_evaluated_at,
                status = excluded.status
            "#,
                params![
                    entry.wallet_address,
                    entry.chain_id,
                    entry.composite_score,
                    entry.added_at,
                    entry.last_evaluated_at,
                    entry.status.as_str(),
                ],
            )
            .context("Failed to upsert watchlist entry")?;
        Ok(())
    }

    pub fn active_watchlist(&self, chain_id: &str) -> Result<Vec<WatchlistEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT wallet_address, chain_id, composite_score, added_at, last_evaluated_at, status
             FROM watchlist WHERE chain_id = ?1 AND status = 'active'
             ORDER BY composite_score DESC",
        )?;
        let rows = stmt
            .query_map(params![chain_id], row_to_watch_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_watchlist_entry(
        &self,
        chain_id: &str,
        wallet_address: &str,
    ) -> Result<Option<WatchlistEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT wallet_address, chain_id, composite_score, added_at, last_evaluated_at, status
                 FROM watchlist WHERE chain_id = ?1 AND wallet_address = ?2",
                params![chain_id, wallet_address],
                row_to_watch_entry,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn active_watchlist_count(&self, chain_id: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM watchlist WHERE chain_id = ?1 AND status = 'active'",
            params![chain_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ========================================================================
    // CUSTOM WATCHLIST (user-curated, always monitored)
    // ========================================================================

    pub fn add_custom_watch(
        &mut self,
        chain_id: &str,
        address: &str,
        label: Option<&str>,
        now: i64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO custom_watchlist (address, chain_id, label, is_active, added_at)
             VALUES (?1, ?2, ?3, 1, ?4)",
            params![address, chain_id, label, now],
        )?;
        Ok(())
    }

    pub fn active_custom_watchlist(&self, chain_id: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT address FROM custom_watchlist WHERE chain_id = ?1 AND is_active = 1",
        )?;
        let rows = stmt
            .query_map(params![chain_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // ========================================================================
    // ALERTS
    // ========================================================================

    /// Append an alert unless one with the same dedup key exists.
    /// Returns true when the row was inserted (caller should emit).
    #[allow(clippy::too_many_arguments)]
    pub fn insert_alert(
        &mut self,
        ts: i64,
        kind: &str,
        chain_id: &str,
        token_address: &str,
        wallets: &[String],
        dedup_key: &str,
        window_ms: i64,
        price_usd: Option<f64>,
        weights_json: Option<&str>,
        payload_json: Option<&str>,
    ) -> Result<bool> {
        let changed = self.conn.execute(
            r#"
            INSERT OR IGNORE INTO alerts (
                ts, kind, chain_id, token_address, wallets_json, dedup_key,
                window_ms, price_usd, weights_json, payload_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                ts,
                kind,
                chain_id,
                token_address,
                serde_json::to_string(wallets)?,
                dedup_key,
                window_ms,
                price_usd,
                weights_json,
                payload_json,
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn alerts_since(&self, since: i64) -> Result<Vec<AlertRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ts, kind, chain_id, token_address, wallets_json, price_usd
             FROM alerts WHERE ts >= ?1 ORDER BY ts ASC",
        )?;
        let rows = stmt
            .query_map(params![since], |row| {
                let wallets_json: String = row.get(5)?;
                Ok(AlertRow {
                    id: row.get(0)?,
                    ts: row.get(1)?,
                    kind: row.get(2)?,
                    chain_id: row.get(3)?,
                    token_address: row.get(4)?,
                    wallets: serde_json::from_str(&wallets_json).unwrap_or_default(),
                    price_usd: row.get(6)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn alert_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM alerts", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ========================================================================
    // MONITOR CURSORS
    // ========================================================================

    pub fn get_cursor(&self, chain_id: &str, wallet_address: &str) -> Result<Option<String>> {
        let cursor = self
            .conn
            .query_row(
                "SELECT last_seen_tx FROM monitor_cursors WHERE chain_id = ?1 AND wallet_address = ?2",
                params![chain_id, wallet_address],
                |row| row.get(0),
            )
            .optional()?;
        Ok(cursor)
    }

    pub fn set_cursor(&mut self, chain_id: &str, wallet_address: &str, tx_hash: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO monitor_cursors (chain_id, wallet_address, last_seen_tx)
             VALUES (?1, ?2, ?3)",
            params![chain_id, wallet_address, tx_hash],
        )?;
        Ok(())
    }
}

fn row_to_trade(row: &rusqlite::Row<'_>) -> rusqlite::Result<Trade> {
    let side_str: String = row.get(5)?;
    let side = TradeSide::from_str(&side_str).unwrap_or(TradeSide::Buy);
    Ok(Trade {
        tx_hash: row.get(0)?,
        ts: row.get(1)?,
        chain_id: row.get(2)?,
        wallet_address: row.get(3)?,
        token_address: row.get(4)?,
        side,
        qty_token: row.get(6)?,
        price_usd: row.get(7)?,
        usd_value: row.get(8)?,
        venue: row.get(9)?,
    })
}

fn row_to_stats(row: &rusqlite::Row<'_>) -> rusqlite::Result<WalletStats30D> {
    Ok(WalletStats30D {
        wallet_address: row.get(0)?,
        chain_id: row.get(1)?,
        trades_count: row.get(2)?,
        realized_pnl_usd: row.get(3)?,
        unrealized_pnl_usd: row.get(4)?,
        best_trade_multiple: row.get(5)?,
        earlyscore_median: row.get(6)?,
        max_drawdown_pct: row.get(7)?,
        last_update: row.get(8)?,
    })
}

fn row_to_watch_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<WatchlistEntry> {
    let status_str: String = row.get(5)?;
    Ok(WatchlistEntry {
        wallet_address: row.get(0)?,
        chain_id: row.get(1)?,
        composite_score: row.get(2)?,
        added_at: row.get(3)?,
        last_evaluated_at: row.get(4)?,
        status: WatchStatus::from_str(&status_str).unwrap_or(WatchStatus::Pending),
    })
}
