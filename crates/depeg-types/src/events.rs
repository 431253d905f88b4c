//! Event types emitted by settlement markets and the oracle daemon.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::{Address, FeedId};

/// A state change recorded by a market or the market factory.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "PascalCase", rename_all_fields = "camelCase")]
pub enum MarketEvent {
    MarketCreated {
        index: u64,
        market: Address,
        feed_id: FeedId,
    },
    LiquidityAdded {
        market: Address,
        provider: Address,
        #[serde_as(as = "DisplayFromStr")]
        amount: u128,
    },
    LiquidityRemoved {
        market: Address,
        provider: Address,
        #[serde_as(as = "DisplayFromStr")]
        amount: u128,
    },
    PolicyBought {
        market: Address,
        id: u64,
        buyer: Address,
        #[serde_as(as = "DisplayFromStr")]
        notional: u128,
        #[serde_as(as = "DisplayFromStr")]
        premium: u128,
        expiry: u64,
    },
    PolicyClaimed {
        market: Address,
        id: u64,
        buyer: Address,
        #[serde_as(as = "DisplayFromStr")]
        payout: u128,
    },
}

/// Envelope for daemon-internal notifications.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub timestamp: u64,
    pub payload: serde_json::Value,
}

/// Daemon event kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    IndexUpdated,
    AttestationSigned,
    SourceQuorumFailed,
    DaemonStatus,
}
