//! Post-mutation checks (9.x).
//!
//! Every position mutation carries a `SettlementBreakdown` of what was booked
//! against collateral. The validator recomputes the collateral delta from it and
//! demands exact equality with what actually changed, then proves the fields
//! the mutation had no business touching are identical. Any failure here means
//! the accounting is wrong and the whole mutation must be discarded.

use crate::borrowing::BorrowingState;
use crate::funding::FundingState;
use crate::math::MathError;
use crate::position::Position;
use crate::types::TokenAmount;
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    NewPosition,
    Increase,
    Decrease,
    CollateralIncrease,
    CollateralDecrease,
    Adl,
}

impl MutationKind {
    /// Kinds whose collateral delta is measured as `before - after`.
    pub fn is_decrease(&self) -> bool {
        matches!(
            self,
            MutationKind::Decrease | MutationKind::CollateralDecrease | MutationKind::Adl
        )
    }

    /// Kinds that may not touch size or entry price.
    pub fn is_collateral_only(&self) -> bool {
        matches!(
            self,
            MutationKind::CollateralIncrease | MutationKind::CollateralDecrease
        )
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MutationKind::NewPosition => "new position",
            MutationKind::Increase => "increase",
            MutationKind::Decrease => "decrease",
            MutationKind::CollateralIncrease => "collateral increase",
            MutationKind::CollateralDecrease => "collateral decrease",
            MutationKind::Adl => "adl",
        };
        f.write_str(name)
    }
}

/// Everything booked against collateral by one mutation, in collateral token units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementBreakdown {
    pub collateral_in: TokenAmount,
    pub collateral_out: TokenAmount,
    pub position_fee: TokenAmount,
    pub funding_owed: TokenAmount,
    pub funding_earned: TokenAmount,
    pub borrow_fee: TokenAmount,
    pub pnl_profit: TokenAmount,
    pub pnl_loss: TokenAmount,
}

impl SettlementBreakdown {
    pub fn credits(&self) -> Result<TokenAmount, MathError> {
        sum(&[self.collateral_in, self.funding_earned, self.pnl_profit])
    }

    pub fn debits(&self) -> Result<TokenAmount, MathError> {
        sum(&[
            self.collateral_out,
            self.position_fee,
            self.funding_owed,
            self.borrow_fee,
            self.pnl_loss,
        ])
    }

    /// Debits other than the withdrawal. what a full close must cover before payout.
    pub fn charges(&self) -> Result<TokenAmount, MathError> {
        sum(&[self.position_fee, self.funding_owed, self.borrow_fee, self.pnl_loss])
    }
}

fn sum(parts: &[TokenAmount]) -> Result<TokenAmount, MathError> {
    parts.iter().try_fold(U256::zero(), |acc, part| {
        acc.checked_add(*part)
            .ok_or(MathError::Overflow("settlement breakdown"))
    })
}

/// Signed change of a collateral balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollateralDelta {
    Up(TokenAmount),
    Down(TokenAmount),
}

impl CollateralDelta {
    pub fn between(from: TokenAmount, to: TokenAmount) -> Self {
        if to >= from {
            CollateralDelta::Up(to - from)
        } else {
            CollateralDelta::Down(from - to)
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            CollateralDelta::Up(v) if !v.is_zero() => CollateralDelta::Down(v),
            CollateralDelta::Down(v) => CollateralDelta::Up(v),
            zero => zero,
        }
    }
}

impl fmt::Display for CollateralDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollateralDelta::Up(v) => write!(f, "+{}", v),
            CollateralDelta::Down(v) => write!(f, "-{}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantError {
    #[error("{kind}: collateral moved {observed}, breakdown says {expected}")]
    CollateralMismatch {
        kind: MutationKind,
        expected: CollateralDelta,
        observed: CollateralDelta,
    },

    #[error("{kind}: fields outside the mutation changed")]
    UntouchedFieldChanged { kind: MutationKind },

    #[error("{kind}: {which} snapshot is not at the market's current index")]
    SnapshotNotCurrent { kind: MutationKind, which: &'static str },

    #[error("{kind}: {which} snapshot moved backwards")]
    SnapshotRegressed { kind: MutationKind, which: &'static str },

    #[error("{kind}: pending fees left unsettled")]
    UnsettledFees { kind: MutationKind },

    #[error("{kind}: closed position still carries balances")]
    NotFullyCleared { kind: MutationKind },

    #[error("{kind}: requires an existing position")]
    MissingPosition { kind: MutationKind },

    #[error("{kind}: position already exists")]
    UnexpectedPosition { kind: MutationKind },

    #[error(transparent)]
    Math(#[from] MathError),
}

/// One mutation as seen by the validator.
#[derive(Debug, Clone, Copy)]
pub struct MutationRecord<'a> {
    pub kind: MutationKind,
    pub before: Option<&'a Position>,
    pub after: &'a Position,
    pub breakdown: &'a SettlementBreakdown,
    pub funding: &'a FundingState,
    pub borrowing: &'a BorrowingState,
}

pub fn validate_mutation(record: &MutationRecord<'_>) -> Result<(), InvariantError> {
    let kind = record.kind;
    match (kind, record.before) {
        (MutationKind::NewPosition, Some(_)) => {
            return Err(InvariantError::UnexpectedPosition { kind })
        }
        (MutationKind::NewPosition, None) => {}
        (_, None) => return Err(InvariantError::MissingPosition { kind }),
        (_, Some(_)) => {}
    }

    check_collateral(record)?;
    check_untouched(record)?;
    check_snapshots(record)?;

    let after = record.after;
    if !after.funding.fees_owed.is_zero()
        || !after.funding.fees_earned.is_zero()
        || !after.borrowing.fees_owed.is_zero()
    {
        return Err(InvariantError::UnsettledFees { kind });
    }
    if after.is_empty() && !after.is_cleared() {
        return Err(InvariantError::NotFullyCleared { kind });
    }
    Ok(())
}

/// credits - debits must equal after - before, exactly. decrease kinds are
/// compared the other way round, before - after against debits - credits.
pub fn check_collateral(record: &MutationRecord<'_>) -> Result<(), InvariantError> {
    let before = record
        .before
        .map(|p| p.collateral_amount)
        .unwrap_or_else(U256::zero);
    let after = record.after.collateral_amount;
    let credits = record.breakdown.credits()?;
    let debits = record.breakdown.debits()?;

    let (expected, observed) = if record.kind.is_decrease() {
        (
            CollateralDelta::between(credits, debits),
            CollateralDelta::between(after, before),
        )
    } else {
        (
            CollateralDelta::between(debits, credits),
            CollateralDelta::between(before, after),
        )
    };

    if expected != observed {
        return Err(InvariantError::CollateralMismatch {
            kind: record.kind,
            expected: if record.kind.is_decrease() { expected.reversed() } else { expected },
            observed: if record.kind.is_decrease() { observed.reversed() } else { observed },
        });
    }
    Ok(())
}

pub fn check_untouched(record: &MutationRecord<'_>) -> Result<(), InvariantError> {
    let Some(before) = record.before else {
        return Ok(());
    };
    let with_sizing = record.kind.is_collateral_only();
    if before.untouched(with_sizing) != record.after.untouched(with_sizing) {
        return Err(InvariantError::UntouchedFieldChanged { kind: record.kind });
    }
    Ok(())
}

pub fn check_snapshots(record: &MutationRecord<'_>) -> Result<(), InvariantError> {
    let kind = record.kind;
    let after = record.after;
    let current = [
        (
            "funding long",
            after.funding.last_long_cumulative,
            record.funding.cumulative_long_funding_fee,
        ),
        (
            "funding short",
            after.funding.last_short_cumulative,
            record.funding.cumulative_short_funding_fee,
        ),
        (
            "borrowing long",
            after.borrowing.last_long_cumulative,
            record.borrowing.cumulative_long_borrow_fee,
        ),
        (
            "borrowing short",
            after.borrowing.last_short_cumulative,
            record.borrowing.cumulative_short_borrow_fee,
        ),
    ];
    for (which, snapshot, market) in current {
        if snapshot != market {
            return Err(InvariantError::SnapshotNotCurrent { kind, which });
        }
    }

    if let Some(before) = record.before {
        let pairs = [
            ("funding long", before.funding.last_long_cumulative, after.funding.last_long_cumulative),
            ("funding short", before.funding.last_short_cumulative, after.funding.last_short_cumulative),
            ("borrowing long", before.borrowing.last_long_cumulative, after.borrowing.last_long_cumulative),
            ("borrowing short", before.borrowing.last_short_cumulative, after.borrowing.last_short_cumulative),
        ];
        for (which, old, new) in pairs {
            if new < old {
                return Err(InvariantError::SnapshotRegressed { kind, which });
            }
        }
    }
    Ok(())
}
