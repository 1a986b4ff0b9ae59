use rust_decimal::Decimal;
use std::sync::Arc;

use crate::api::{ExchangeGateway, GatewayError};
use crate::execution::quantization::{quantize_buy, quantize_sell, QuantizationRejection};
use crate::execution::PositionState;
use crate::models::{base_asset, ExchangeFilters, Order, OrderSide};

/// Result of one buy or sell attempt
#[derive(Debug)]
pub enum ExecutionOutcome {
    /// Exchange confirmed a fill; position state was updated
    Executed(Order),
    /// Exchange accepted the order but filled nothing; state untouched
    NotFilled(Order),
    /// Quantity failed lot-size or notional rules; no order was sent
    Rejected(QuantizationRejection),
    /// Price lookup or order call failed; state untouched
    Failed(GatewayError),
    /// Holding flag with nothing held was reset to idle; no order was sent
    Repaired,
}

impl ExecutionOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self, Self::Executed(_))
    }
}

/// Places market orders for one symbol and commits confirmed fills
pub struct OrderExecutor {
    symbol: String,
    gateway: Arc<dyn ExchangeGateway>,
    filters: ExchangeFilters,
}

impl OrderExecutor {
    pub fn new(
        symbol: impl Into<String>,
        gateway: Arc<dyn ExchangeGateway>,
        filters: ExchangeFilters,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            gateway,
            filters,
        }
    }

    pub fn filters(&self) -> &ExchangeFilters {
        &self.filters
    }

    /// Spend `quote_amount` on a market buy
    pub async fn execute_buy(
        &self,
        position: &mut PositionState,
        quote_amount: Decimal,
    ) -> ExecutionOutcome {
        let symbol = self.symbol.as_str();
        let base = base_asset(symbol);

        let price = match self.gateway.current_price(symbol).await {
            Ok(price) => price,
            Err(e) => {
                tracing::error!("[{}] Market BUY FAILED (price lookup): {}", symbol, e);
                return ExecutionOutcome::Failed(e);
            }
        };

        let quantity = match quantize_buy(quote_amount, price, &self.filters) {
            Ok(qty) => qty,
            Err(rejection) => {
                self.log_rejection(OrderSide::Buy, &rejection);
                return ExecutionOutcome::Rejected(rejection);
            }
        };

        tracing::info!(
            "[{}] Placing market BUY: {} {} @ approx {}",
            symbol,
            quantity.normalize(),
            base,
            price.normalize()
        );

        match self.gateway.place_market_buy(symbol, quantity).await {
            Ok(ack) => {
                let order = Order::from_ack(symbol, OrderSide::Buy, quantity, ack);
                if !order.is_executed() {
                    tracing::warn!(
                        "[{}] Market BUY not filled (status {:?}), position unchanged",
                        symbol,
                        order.status
                    );
                    return ExecutionOutcome::NotFilled(order);
                }

                position.commit_buy(order.executed_qty);
                tracing::info!(
                    "[{}] Market BUY executed: {} {}",
                    symbol,
                    order.executed_qty.normalize(),
                    base
                );
                ExecutionOutcome::Executed(order)
            }
            Err(e) => {
                tracing::error!("[{}] Market BUY FAILED: {}", symbol, e);
                ExecutionOutcome::Failed(e)
            }
        }
    }

    /// Sell the whole held quantity, or repair an empty holding
    pub async fn execute_sell(&self, position: &mut PositionState) -> ExecutionOutcome {
        let symbol = self.symbol.as_str();
        let base = base_asset(symbol);

        if position.is_inconsistent() {
            tracing::warn!(
                "[{}] WARNING: State error: in position but qty={}, resetting state",
                symbol,
                position.held_quantity().normalize()
            );
            position.force_idle();
            return ExecutionOutcome::Repaired;
        }

        let quantity = match quantize_sell(position.held_quantity(), &self.filters) {
            Ok(qty) => qty,
            Err(rejection) => {
                self.log_rejection(OrderSide::Sell, &rejection);
                return ExecutionOutcome::Rejected(rejection);
            }
        };

        tracing::info!(
            "[{}] Placing market SELL: {} {}",
            symbol,
            quantity.normalize(),
            base
        );

        match self.gateway.place_market_sell(symbol, quantity).await {
            Ok(ack) => {
                let order = Order::from_ack(symbol, OrderSide::Sell, quantity, ack);
                if !order.is_executed() {
                    tracing::warn!(
                        "[{}] Market SELL not filled (status {:?}), position unchanged",
                        symbol,
                        order.status
                    );
                    return ExecutionOutcome::NotFilled(order);
                }

                position.commit_sell();
                tracing::info!(
                    "[{}] SELL executed: qty={}",
                    symbol,
                    order.executed_qty.normalize()
                );
                ExecutionOutcome::Executed(order)
            }
            Err(e) => {
                tracing::error!("[{}] Market SELL FAILED: {}", symbol, e);
                ExecutionOutcome::Failed(e)
            }
        }
    }

    fn log_rejection(&self, side: OrderSide, rejection: &QuantizationRejection) {
        let symbol = self.symbol.as_str();
        match rejection {
            QuantizationRejection::BelowMinNotional {
                notional,
                min_notional,
            } => {
                // Show the notional at the symbol's price precision
                let shown = match self.filters.tick_size {
                    Some(tick) => notional.round_dp(tick.normalize().scale()),
                    None => *notional,
                };
                tracing::warn!(
                    "[{}] {} rejected: order notional {} < min_notional {}",
                    symbol,
                    side,
                    shown.normalize(),
                    min_notional.normalize()
                );
            }
            QuantizationRejection::ZeroQuantity { .. } => {
                tracing::warn!("[{}] {} rejected: {}", symbol, side, rejection);
            }
        }
    }
}
