//! Fills a cache from a slow function and looks the same keys up again.
//!
//! Run with `RUST_LOG=genericache=debug` to see the fills.

use std::thread;
use std::time::Duration;

use genericache::Cache;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Error)]
#[error("no value for key {0}")]
struct NoValue(i32);

fn fill(i: &i32) -> Result<String, NoValue> {
    thread::sleep(Duration::from_millis(200));
    if *i < 0 {
        return Err(NoValue(*i));
    }
    Ok(format!("{} => {}", i, i + 5))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cache = Cache::new(fill, false);
    for _ in 0..2 {
        for key in [1, 2, -1] {
            match cache.get(key) {
                Ok(v) => println!("{}", v),
                Err(e) => println!("error: {}", e),
            }
        }
    }
    println!("{:?}", cache);
}
