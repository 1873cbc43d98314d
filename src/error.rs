//! Engine error taxonomy. All variants except `Internal` are user-visible and
//! mapped to HTTP statuses by the API layer; none of them mutate engine state.

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The request violated a static precondition: empty symbol, non-positive
    /// quantity, or a LIMIT order without a positive price.
    #[error("invalid order data")]
    InvalidOrderData,

    /// A MARKET order asked for more than the opposite side displays. The
    /// order is rejected atomically; the book is untouched.
    #[error("insufficient liquidity")]
    InsufficientLiquidity,

    /// The referenced order id is unknown.
    #[error("order not found")]
    OrderNotFound,

    /// The referenced order is already filled or cancelled, or is no longer at
    /// its expected book position.
    #[error("cannot cancel: order already filled or cancelled")]
    OrderAlreadyFinalized,

    /// Book bookkeeping no longer agrees with itself. Indicates a bug, not a
    /// caller mistake.
    #[error("internal book inconsistency: {0}")]
    Internal(&'static str),
}
