//! polykv demo runner
//!
//! Walks through the store's command families against an in-process keyspace
//! and logs every command with its reply, `redis-cli` style.

use anyhow::{bail, Context};
use bytes::Bytes;
use polykv::commands::{CommandHandler, Reply};
use polykv::storage::{start_expiry_sweeper, Keyspace, KeyspaceConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Which scenarios to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Demo {
    Basics,
    Hashes,
    Lists,
    Sets,
    SortedSets,
    All,
}

impl Demo {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "basics" => Some(Demo::Basics),
            "hashes" => Some(Demo::Hashes),
            "lists" => Some(Demo::Lists),
            "sets" => Some(Demo::Sets),
            "zsets" => Some(Demo::SortedSets),
            "all" => Some(Demo::All),
            _ => None,
        }
    }

    fn includes(self, other: Demo) -> bool {
        self == Demo::All || self == other
    }
}

/// Demo configuration
#[derive(Debug)]
struct Config {
    /// Seed for SPOP / SRANDMEMBER, so runs are reproducible
    seed: Option<u64>,
    /// Scenarios to run
    demo: Demo,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: None,
            demo: Demo::All,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> anyhow::Result<Self> {
        let mut config = Config::default();
        let mut args = std::env::args().skip(1);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--seed" | "-s" => {
                    let value = args.next().context("--seed requires a value")?;
                    let seed = value
                        .parse::<u64>()
                        .with_context(|| format!("invalid seed: {value}"))?;
                    config.seed = Some(seed);
                }
                "--demo" | "-d" => {
                    let value = args.next().context("--demo requires a value")?;
                    config.demo = Demo::parse(&value)
                        .with_context(|| format!("unknown demo: {value}"))?;
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("polykv version {}", polykv::VERSION);
                    std::process::exit(0);
                }
                other => {
                    print_help();
                    bail!("unknown argument: {other}");
                }
            }
        }

        Ok(config)
    }
}

fn print_help() {
    println!(
        r#"
polykv - An In-Memory Multi-Type Key-Value Store (demo runner)

USAGE:
    polykv [OPTIONS]

OPTIONS:
    -d, --demo <NAME>    basics | hashes | lists | sets | zsets | all (default: all)
    -s, --seed <SEED>    Seed the RNG behind SPOP / SRANDMEMBER
    -v, --version        Print version information
    -h, --help           Print this help message

Set RUST_LOG=debug to see expiry and blocking-pop internals.
"#
    );
}

/// Runs commands and logs their replies.
struct Session {
    handler: CommandHandler,
}

impl Session {
    async fn run(&self, command: &[&str]) -> Reply {
        let args: Vec<Bytes> = command
            .iter()
            .map(|s| Bytes::copy_from_slice(s.as_bytes()))
            .collect();
        let reply = self.handler.execute(&args).await;
        if reply.is_error() {
            warn!("> {}\n{}", command.join(" "), reply);
        } else {
            info!("> {}\n{}", command.join(" "), reply);
        }
        reply
    }
}

async fn basics(session: &Session) {
    info!("=== Basics: set, get, expire, delete, rename ===");

    session.run(&["SET", "name", "Alice"]).await;
    session.run(&["GET", "name"]).await;

    session.run(&["SET", "session:token", "abc123", "PX", "300"]).await;
    session.run(&["PTTL", "session:token"]).await;
    session.run(&["SET", "permanent_key", "permanent_value"]).await;
    session.run(&["TTL", "permanent_key"]).await;
    session.run(&["TTL", "nonexistent_key"]).await;

    session.run(&["SET", "persist_key", "persist_value", "EX", "15"]).await;
    session.run(&["PERSIST", "persist_key"]).await;
    session.run(&["TTL", "persist_key"]).await;

    info!("waiting for session:token to expire...");
    tokio::time::sleep(Duration::from_millis(400)).await;
    session.run(&["GET", "session:token"]).await;
    session.run(&["EXISTS", "session:token"]).await;

    session
        .run(&["MSET", "key1", "value1", "key2", "value2", "key3", "value3"])
        .await;
    session.run(&["EXISTS", "key1", "key2", "nonexistent"]).await;
    session.run(&["DEL", "key1"]).await;
    session.run(&["UNLINK", "key2", "key3"]).await;

    session.run(&["SET", "old_name", "old_value"]).await;
    session.run(&["RENAME", "old_name", "new_name"]).await;
    session.run(&["GET", "new_name"]).await;
    session.run(&["SET", "source", "source_value"]).await;
    session.run(&["RENAMENX", "source", "new_name"]).await;
    session.run(&["RENAMENX", "source", "unique_name"]).await;

    session.run(&["INCR", "visits"]).await;
    session.run(&["INCRBY", "visits", "41"]).await;
    session.run(&["KEYS", "*name*"]).await;
}

async fn hashes(session: &Session) {
    info!("=== Hashes ===");

    session
        .run(&[
            "HSET", "user:1001", "name", "Alice", "email", "alice@example.com", "age", "28",
            "city", "New York", "country", "USA",
        ])
        .await;
    session.run(&["HGET", "user:1001", "name"]).await;
    session.run(&["HMGET", "user:1001", "name", "email", "phone"]).await;
    session.run(&["HGETALL", "user:1001"]).await;
    session.run(&["HEXISTS", "user:1001", "phone"]).await;
    session.run(&["HDEL", "user:1001", "country"]).await;
    session.run(&["HINCRBY", "user:1001", "age", "5"]).await;
    session.run(&["HSET", "user:1001", "score", "100.5"]).await;
    session.run(&["HINCRBYFLOAT", "user:1001", "score", "15.3"]).await;
    session.run(&["HSETNX", "user:1001", "name", "Bob"]).await;
    session.run(&["HSETNX", "user:1001", "phone", "123-456-7890"]).await;
    session.run(&["HLEN", "user:1001"]).await;
    session.run(&["HINCRBY", "user:1001", "name", "1"]).await;
}

async fn lists(session: &Session) {
    info!("=== Lists ===");

    session.run(&["LPUSH", "tasks", "task1"]).await;
    session.run(&["LPUSH", "tasks", "task2", "task3", "task4"]).await;
    session.run(&["RPUSH", "tasks", "task5", "task6"]).await;
    session.run(&["LRANGE", "tasks", "0", "-1"]).await;
    session.run(&["LPOP", "tasks"]).await;
    session.run(&["RPOP", "tasks"]).await;
    session.run(&["LINSERT", "tasks", "BEFORE", "task3", "urgent_task"]).await;
    session
        .run(&["LINSERT", "tasks", "AFTER", "task2", "follow_up_task"])
        .await;
    session
        .run(&["RPUSH", "tasks", "duplicate", "duplicate", "duplicate"])
        .await;
    session.run(&["LREM", "tasks", "2", "duplicate"]).await;
    session.run(&["LSET", "tasks", "1", "updated_task"]).await;
    session.run(&["LTRIM", "tasks", "1", "3"]).await;
    session.run(&["LRANGE", "tasks", "0", "-1"]).await;

    session.run(&["RPUSH", "queue:pending", "job1", "job2"]).await;
    session
        .run(&["RPOPLPUSH", "queue:pending", "queue:processing"])
        .await;

    let worker = {
        let handler = session.handler.clone();
        tokio::spawn(async move {
            let args = ["BLPOP", "notifications", "5"].map(Bytes::from);
            handler.execute(&args).await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    session.run(&["RPUSH", "notifications", "you have mail"]).await;
    match worker.await {
        Ok(reply) => info!("> BLPOP notifications 5 (from a worker task)\n{}", reply),
        Err(e) => warn!("blocking worker failed: {}", e),
    }
}

async fn sets(session: &Session) {
    info!("=== Sets ===");

    session
        .run(&["SADD", "tags:post1", "rust", "database", "redis", "rust"])
        .await;
    session.run(&["SADD", "tags:post2", "rust", "async", "tokio"]).await;
    session.run(&["SMEMBERS", "tags:post1"]).await;
    session.run(&["SISMEMBER", "tags:post1", "redis"]).await;
    session.run(&["SCARD", "tags:post1"]).await;
    session.run(&["SINTER", "tags:post1", "tags:post2"]).await;
    session.run(&["SUNION", "tags:post1", "tags:post2"]).await;
    session.run(&["SDIFF", "tags:post1", "tags:post2"]).await;
    session
        .run(&["SUNIONSTORE", "tags:all", "tags:post1", "tags:post2"])
        .await;
    session.run(&["SMOVE", "tags:post1", "tags:post2", "redis"]).await;
    session.run(&["SRANDMEMBER", "tags:all", "3"]).await;
    session.run(&["SRANDMEMBER", "tags:all", "-3"]).await;
    session.run(&["SPOP", "tags:all"]).await;
    session.run(&["SREM", "tags:post2", "tokio", "missing"]).await;
}

async fn sorted_sets(session: &Session) {
    info!("=== Sorted sets ===");

    session
        .run(&[
            "ZADD", "leaderboard", "100", "player1", "150", "player2", "75", "player3", "200",
            "player4", "125", "player5",
        ])
        .await;
    session
        .run(&["ZREVRANGE", "leaderboard", "0", "2", "WITHSCORES"])
        .await;
    session.run(&["ZRANK", "leaderboard", "player1"]).await;
    session.run(&["ZREVRANK", "leaderboard", "player1"]).await;
    session.run(&["ZSCORE", "leaderboard", "player3"]).await;
    session.run(&["ZINCRBY", "leaderboard", "50", "player3"]).await;
    session.run(&["ZCOUNT", "leaderboard", "(100", "+inf"]).await;
    session
        .run(&["ZRANGEBYSCORE", "leaderboard", "100", "175", "WITHSCORES", "LIMIT", "0", "2"])
        .await;
    session.run(&["ZREM", "leaderboard", "player5"]).await;
    session.run(&["ZREMRANGEBYRANK", "leaderboard", "0", "0"]).await;
    session
        .run(&["ZREMRANGEBYSCORE", "leaderboard", "-inf", "(150"])
        .await;
    session.run(&["ZRANGE", "leaderboard", "0", "-1", "WITHSCORES"]).await;
    session.run(&["ZCARD", "leaderboard"]).await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let keyspace = Arc::new(Keyspace::with_config(KeyspaceConfig {
        rng_seed: config.seed,
        ..KeyspaceConfig::default()
    }));
    info!(
        version = polykv::VERSION,
        seed = ?config.seed,
        "Keyspace initialized"
    );

    let _sweeper = start_expiry_sweeper(Arc::clone(&keyspace));

    let session = Session {
        handler: CommandHandler::new(Arc::clone(&keyspace)),
    };

    session.run(&["PING"]).await;

    if config.demo.includes(Demo::Basics) {
        basics(&session).await;
    }
    if config.demo.includes(Demo::Hashes) {
        hashes(&session).await;
    }
    if config.demo.includes(Demo::Lists) {
        lists(&session).await;
    }
    if config.demo.includes(Demo::Sets) {
        sets(&session).await;
    }
    if config.demo.includes(Demo::SortedSets) {
        sorted_sets(&session).await;
    }

    let stats = keyspace.stats();
    info!(
        keys = stats.keys,
        volatile_keys = stats.volatile_keys,
        used_memory = stats.used_memory,
        reads = stats.reads,
        writes = stats.writes,
        expired = stats.expired,
        "Demo complete"
    );

    Ok(())
}
