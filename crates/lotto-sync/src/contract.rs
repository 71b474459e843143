//! Read-only contract call surface
//!
//! Hand-rolled 4-byte selectors and fixed 32-byte word decoding. The
//! contract's view functions return flat tuples with fixed-size arrays
//! inlined, so no dynamic ABI handling is needed.

use crate::{Error, Result, RpcClient};
use alloy_primitives::keccak256;
use async_trait::async_trait;
use lotto_core::{word_u128, word_u64};
use std::sync::Arc;

/// First winning number still at the sentinel value means undrawn.
pub const UNDRAWN_SENTINEL: [u64; 4] = [0, 0, 0, 0];

/// Authoritative per-round state as reported by the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundDetails {
    /// Round number
    pub round: u64,
    /// Contract-side lifecycle status code
    pub status: u64,
    /// Prize pool in wei
    pub prize_pool_wei: u128,
    /// Total winners across tiers
    pub total_winners: u64,
    /// Gold tier winners
    pub gold_winners: u64,
    /// Silver tier winners
    pub silver_winners: u64,
    /// Bronze tier winners
    pub bronze_winners: u64,
    /// Drawn winning numbers, all-zero while undrawn
    pub winning_numbers: [u64; 4],
    /// Delay-function difficulty for the round
    pub difficulty: u64,
    /// Block at which the draw was initiated
    pub draw_initiated_block: u64,
    /// Block whose randomness seeds the draw
    pub randao_block: u64,
    /// Committed randomness value
    pub randao_value: u64,
    /// Payout per winner for gold, silver and bronze tiers, in wei
    pub payouts_wei: [u128; 3],
}

impl RoundDetails {
    /// Whether the round has been drawn.
    pub fn is_drawn(&self) -> bool {
        self.winning_numbers != UNDRAWN_SENTINEL
    }
}

/// Live state of the round currently open for ticket sales.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentRoundInfo {
    /// Round number
    pub round: u64,
    /// Delay-function difficulty
    pub difficulty: u64,
    /// Prize pool in wei
    pub prize_pool_wei: u128,
    /// Unix timestamp of the scheduled draw
    pub draw_time: u64,
    /// Seconds remaining until the draw
    pub seconds_until_draw: u64,
}

/// Read-only view of the lottery contract.
#[async_trait]
pub trait ContractReader: Send + Sync {
    /// Full details for a round.
    async fn round_details(&self, round: u64) -> Result<RoundDetails>;

    /// Number of the round currently open for sales.
    async fn current_round(&self) -> Result<u64>;

    /// Prize pool for a round, in wei.
    async fn round_prize_pool(&self, round: u64) -> Result<u128>;

    /// Live state of the current round.
    async fn current_round_info(&self) -> Result<CurrentRoundInfo>;
}

/// [`ContractReader`] backed by raw `eth_call` over JSON-RPC.
pub struct LotteryContract {
    rpc: Arc<RpcClient>,
    address: String,
}

impl LotteryContract {
    /// Bind to a deployed contract address.
    pub fn new(rpc: Arc<RpcClient>, address: impl Into<String>) -> Self {
        Self {
            rpc,
            address: address.into(),
        }
    }

    async fn call_words(&self, calldata: String, min_words: usize) -> Result<Vec<u8>> {
        let ret = self.rpc.eth_call(&self.address, &calldata).await?;
        let bytes = hex::decode(ret.strip_prefix("0x").unwrap_or(&ret))
            .map_err(|e| Error::InvalidResponse(format!("bad return data: {}", e)))?;
        if bytes.len() < min_words * 32 {
            return Err(Error::InvalidResponse(format!(
                "return data too short: need {} words, got {} bytes",
                min_words,
                bytes.len()
            )));
        }
        Ok(bytes)
    }
}

#[async_trait]
impl ContractReader for LotteryContract {
    async fn round_details(&self, round: u64) -> Result<RoundDetails> {
        let data = self
            .call_words(encode_call("getDetailedRoundInfo(uint256)", &[round]), 18)
            .await?;

        Ok(RoundDetails {
            round: word_u64(&data, 0)?,
            status: word_u64(&data, 1)?,
            prize_pool_wei: word_u128(&data, 2)?,
            total_winners: word_u64(&data, 3)?,
            gold_winners: word_u64(&data, 4)?,
            silver_winners: word_u64(&data, 5)?,
            bronze_winners: word_u64(&data, 6)?,
            winning_numbers: [
                word_u64(&data, 7)?,
                word_u64(&data, 8)?,
                word_u64(&data, 9)?,
                word_u64(&data, 10)?,
            ],
            difficulty: word_u64(&data, 11)?,
            draw_initiated_block: word_u64(&data, 12)?,
            randao_block: word_u64(&data, 13)?,
            randao_value: word_u64(&data, 14)?,
            payouts_wei: [
                word_u128(&data, 15)?,
                word_u128(&data, 16)?,
                word_u128(&data, 17)?,
            ],
        })
    }

    async fn current_round(&self) -> Result<u64> {
        let data = self
            .call_words(encode_call("currentRoundNumber()", &[]), 1)
            .await?;
        Ok(word_u64(&data, 0)?)
    }

    async fn round_prize_pool(&self, round: u64) -> Result<u128> {
        let data = self
            .call_words(encode_call("roundPrizePool(uint256)", &[round]), 1)
            .await?;
        Ok(word_u128(&data, 0)?)
    }

    async fn current_round_info(&self) -> Result<CurrentRoundInfo> {
        let data = self
            .call_words(encode_call("getCurrentRoundInfo()", &[]), 5)
            .await?;
        Ok(CurrentRoundInfo {
            round: word_u64(&data, 0)?,
            difficulty: word_u64(&data, 1)?,
            prize_pool_wei: word_u128(&data, 2)?,
            draw_time: word_u64(&data, 3)?,
            seconds_until_draw: word_u64(&data, 4)?,
        })
    }
}

/// Encode calldata: 4-byte selector plus 32-byte big-endian args.
fn encode_call(signature: &str, args: &[u64]) -> String {
    let hash = keccak256(signature.as_bytes());
    let mut calldata = format!("0x{}", hex::encode(&hash[..4]));
    for arg in args {
        calldata.push_str(&format!("{:064x}", arg));
    }
    calldata
}
