use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::store::Store;
use crate::types::{AlertRow, AlertType, FootballOddsRow};

/// Derives cross-bookmaker signals from one cycle's football odds:
/// arbitrage windows and value bets. Basketball is deliberately left out
/// because the alert table references the football match table.
pub struct AlertDetector {
    store: Arc<dyn Store>,
    arbitrage_threshold: f64,
    value_bet_threshold: f64,
}

impl AlertDetector {
    pub fn new(store: Arc<dyn Store>, arbitrage_threshold: f64, value_bet_threshold: f64) -> Self {
        Self {
            store,
            arbitrage_threshold,
            value_bet_threshold,
        }
    }

    /// Check every match with at least two bookmakers and batch-insert
    /// the resulting alerts. Emission is best-effort.
    pub async fn check_for_alerts(
        &self,
        match_odds: &HashMap<Uuid, Vec<&FootballOddsRow>>,
    ) -> usize {
        let mut alerts = Vec::new();

        for (match_id, odds_list) in match_odds {
            if odds_list.len() < 2 {
                continue;
            }
            if let Some(alert) = check_arbitrage(*match_id, odds_list, self.arbitrage_threshold) {
                alerts.push(alert);
            }
            alerts.extend(check_value_bets(
                *match_id,
                odds_list,
                self.value_bet_threshold,
            ));
        }

        if alerts.is_empty() {
            return 0;
        }

        match self.store.insert_alerts(&alerts).await {
            Ok(count) => count,
            Err(e) => {
                error!("Error inserting alerts batch: {}", e);
                0
            }
        }
    }
}

/// Arbitrage exists when the best odds per outcome satisfy
/// `Σ 1/best < 1`; the complement is the guaranteed profit fraction.
fn check_arbitrage(
    match_id: Uuid,
    odds_list: &[&FootballOddsRow],
    threshold: f64,
) -> Option<AlertRow> {
    let best_home = odds_list.iter().map(|o| o.home_odd).fold(0.0, f64::max);
    let best_draw = odds_list
        .iter()
        .map(|o| o.draw_odd.unwrap_or(0.0))
        .fold(0.0, f64::max);
    let best_away = odds_list.iter().map(|o| o.away_odd).fold(0.0, f64::max);

    let total = if best_draw == 0.0 {
        // Market without a draw.
        (1.0 / best_home) + (1.0 / best_away)
    } else {
        (1.0 / best_home) + (1.0 / best_draw) + (1.0 / best_away)
    };

    let profit_pct = (1.0 - total) * 100.0;
    if profit_pct <= threshold {
        return None;
    }

    let home_bookmaker = odds_list
        .iter()
        .find(|o| o.home_odd == best_home)
        .map(|o| o.bookmaker_id);
    let draw_bookmaker = if best_draw > 0.0 {
        odds_list
            .iter()
            .find(|o| o.draw_odd == Some(best_draw))
            .map(|o| o.bookmaker_id)
    } else {
        None
    };
    let away_bookmaker = odds_list
        .iter()
        .find(|o| o.away_odd == best_away)
        .map(|o| o.bookmaker_id);

    Some(AlertRow {
        match_id,
        alert_type: AlertType::Arbitrage,
        title: format!("Arbitragem detectada! Lucro garantido: {:.2}%", profit_pct),
        details: json!({
            "profit_percentage": round2(profit_pct),
            "best_home": best_home,
            "best_draw": best_draw,
            "best_away": best_away,
            "home_bookmaker": home_bookmaker,
            "draw_bookmaker": draw_bookmaker,
            "away_bookmaker": away_bookmaker,
        }),
    })
}

/// A value bet is an outcome priced well above the group average:
/// `edge = (value − avg) / avg × 100`.
fn check_value_bets(match_id: Uuid, odds_list: &[&FootballOddsRow], threshold: f64) -> Vec<AlertRow> {
    let mut alerts = Vec::new();
    let count = odds_list.len() as f64;

    let avg_home = odds_list.iter().map(|o| o.home_odd).sum::<f64>() / count;
    let avg_draw = odds_list
        .iter()
        .map(|o| o.draw_odd.unwrap_or(0.0))
        .sum::<f64>()
        / count;
    let avg_away = odds_list.iter().map(|o| o.away_odd).sum::<f64>() / count;

    for odds in odds_list {
        let outcomes = [
            ("home", avg_home, Some(odds.home_odd)),
            ("draw", avg_draw, odds.draw_odd),
            ("away", avg_away, Some(odds.away_odd)),
        ];

        for (outcome, avg, value) in outcomes {
            let Some(value) = value else {
                continue;
            };
            if avg == 0.0 {
                continue;
            }

            let edge = ((value - avg) / avg) * 100.0;
            if edge >= threshold {
                alerts.push(AlertRow {
                    match_id,
                    alert_type: AlertType::ValueBet,
                    title: format!(
                        "Value bet detectado! {} @ {:.2} ({:.1}% acima da média)",
                        outcome.to_uppercase(),
                        value,
                        edge
                    ),
                    details: json!({
                        "outcome": outcome,
                        "odds": value,
                        "average_odds": round2(avg),
                        "edge_percentage": round2(edge),
                        "bookmaker_id": odds.bookmaker_id,
                    }),
                });
            }
        }
    }

    alerts
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
