// 11.0: position storage. one record per (market, owner, side); a full close removes it.

use crate::position::{Position, PositionKey};
use crate::types::{AccountId, MarketId};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct PositionStore {
    positions: HashMap<PositionKey, Position>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PositionKey) -> Option<&Position> {
        self.positions.get(key)
    }

    pub fn get_mut(&mut self, key: &PositionKey) -> Option<&mut Position> {
        self.positions.get_mut(key)
    }

    pub fn contains(&self, key: &PositionKey) -> bool {
        self.positions.contains_key(key)
    }

    /// Insert or replace, returning the previous record.
    pub fn upsert(&mut self, position: Position) -> Option<Position> {
        self.positions.insert(position.key, position)
    }

    pub fn remove(&mut self, key: &PositionKey) -> Option<Position> {
        self.positions.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn positions_for_market(&self, market: MarketId) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(move |p| p.key.market == market)
    }

    pub fn positions_for_owner(&self, owner: AccountId) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(move |p| p.key.owner == owner)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
