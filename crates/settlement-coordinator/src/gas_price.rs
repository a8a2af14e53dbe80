//! A short-lived gas-price cache, default TTL 30s.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use settlement_evm::EvmChannelClient;
use settlement_types::SettlementError;

pub const DEFAULT_GAS_PRICE_CACHE_DURATION: Duration = Duration::from_secs(30);

struct Cached {
    price: u128,
    fetched_at: Instant,
}

pub struct GasPriceCache {
    cached: Mutex<Option<Cached>>,
    ttl: Duration,
}

impl GasPriceCache {
    pub fn new(ttl: Duration) -> Self {
        GasPriceCache {
            cached: Mutex::new(None),
            ttl,
        }
    }

    pub async fn get<C: EvmChannelClient + ?Sized>(&self, client: &C) -> Result<u128, SettlementError> {
        {
            let guard = self.cached.lock();
            if let Some(cached) = guard.as_ref() {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(cached.price);
                }
            }
        }
        let price = client.gas_price().await?;
        *self.cached.lock() = Some(Cached {
            price,
            fetched_at: Instant::now(),
        });
        Ok(price)
    }
}

impl Default for GasPriceCache {
    fn default() -> Self {
        Self::new(DEFAULT_GAS_PRICE_CACHE_DURATION)
    }
}
