//! Requests accepted by `Engine::execute`.

use crate::invariant::MutationKind;
use crate::position::PositionKey;
use crate::types::{AssetId, OrderKey, Rate, TokenAmount, Usd};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    NewPosition {
        collateral_token: AssetId,
        collateral_in: TokenAmount,
        size_delta_usd: Usd,
        stop_loss: Option<OrderKey>,
        take_profit: Option<OrderKey>,
    },
    Increase {
        collateral_in: TokenAmount,
        size_delta_usd: Usd,
    },
    /// A `size_delta_usd` at or above the position's size closes it and pays
    /// out all remaining collateral; `collateral_out` only applies to partials.
    Decrease {
        size_delta_usd: Usd,
        collateral_out: TokenAmount,
    },
    CollateralIncrease {
        amount: TokenAmount,
    },
    CollateralDecrease {
        amount: TokenAmount,
    },
    /// Forced decrease of a profitable position at the oracle price.
    Adl {
        size_delta_usd: Usd,
    },
}

impl RequestKind {
    pub fn mutation_kind(&self) -> MutationKind {
        match self {
            RequestKind::NewPosition { .. } => MutationKind::NewPosition,
            RequestKind::Increase { .. } => MutationKind::Increase,
            RequestKind::Decrease { .. } => MutationKind::Decrease,
            RequestKind::CollateralIncrease { .. } => MutationKind::CollateralIncrease,
            RequestKind::CollateralDecrease { .. } => MutationKind::CollateralDecrease,
            RequestKind::Adl { .. } => MutationKind::Adl,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub key: PositionKey,
    pub kind: RequestKind,
    /// Overrides the engine default when set
    pub max_slippage: Option<Rate>,
}

impl Request {
    pub fn new(key: PositionKey, kind: RequestKind) -> Self {
        Self {
            key,
            kind,
            max_slippage: None,
        }
    }

    pub fn open(
        key: PositionKey,
        collateral_token: AssetId,
        collateral_in: TokenAmount,
        size_delta_usd: Usd,
    ) -> Self {
        Self::new(
            key,
            RequestKind::NewPosition {
                collateral_token,
                collateral_in,
                size_delta_usd,
                stop_loss: None,
                take_profit: None,
            },
        )
    }

    pub fn increase(key: PositionKey, collateral_in: TokenAmount, size_delta_usd: Usd) -> Self {
        Self::new(
            key,
            RequestKind::Increase {
                collateral_in,
                size_delta_usd,
            },
        )
    }

    pub fn decrease(key: PositionKey, size_delta_usd: Usd, collateral_out: TokenAmount) -> Self {
        Self::new(
            key,
            RequestKind::Decrease {
                size_delta_usd,
                collateral_out,
            },
        )
    }

    pub fn deposit(key: PositionKey, amount: TokenAmount) -> Self {
        Self::new(key, RequestKind::CollateralIncrease { amount })
    }

    pub fn withdraw(key: PositionKey, amount: TokenAmount) -> Self {
        Self::new(key, RequestKind::CollateralDecrease { amount })
    }

    pub fn adl(key: PositionKey, size_delta_usd: Usd) -> Self {
        Self::new(key, RequestKind::Adl { size_delta_usd })
    }

    pub fn with_max_slippage(mut self, max_slippage: Rate) -> Self {
        self.max_slippage = Some(max_slippage);
        self
    }

    /// Attach stop loss / take profit keys. only meaningful on `NewPosition`.
    pub fn with_conditional_orders(mut self, sl: Option<OrderKey>, tp: Option<OrderKey>) -> Self {
        if let RequestKind::NewPosition {
            stop_loss,
            take_profit,
            ..
        } = &mut self.kind
        {
            *stop_loss = sl;
            *take_profit = tp;
        }
        self
    }
}
