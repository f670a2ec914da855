//! Muninn Algorithms
//!
//! The algorithm variants that plug into `muninn-core`'s framework:
//!
//! - [`Momentum`] — dual-EMA crossover alpha
//! - [`MeanReversion`] — rolling z-score alpha
//! - [`Twap`] — time-sliced execution with cumulative catch-up
//! - [`Vwap`] — volume-profile execution with a participation cap
//!
//! Alpha strategies target a signed position and trade the delta;
//! execution strategies work a parent quantity across an interval.
//! Strategy-specific state (EMA values, rolling windows, slice counters)
//! lives inside each variant; everything reaches the engine through the
//! [`muninn_core::algo::AlgoContext`] it was initialized with.

pub mod mean_reversion;
pub mod momentum;
pub mod test_helpers;
pub mod twap;
pub mod vwap;

pub use mean_reversion::{MeanReversion, MeanReversionParams};
pub use momentum::{Momentum, MomentumParams};
pub use twap::{Twap, TwapParams};
pub use vwap::{Vwap, VwapParams};

use anyhow::{bail, Result};
use muninn_core::algo::AlgoState;

/// Enforce one lifecycle transition, shared by every variant.
pub(crate) fn transition(state: &mut AlgoState, to: AlgoState) -> Result<()> {
    if !state.can_transition_to(to) {
        bail!("illegal strategy transition {} -> {}", state, to);
    }
    *state = to;
    Ok(())
}
