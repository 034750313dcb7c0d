//! Chain parameters for wallet clients.

use axum::{Json, extract::State};
use serde::Serialize;

use chainmart_core::Currency;

use crate::chain::NetworkConfig;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CurrencyInfo {
    pub code: &'static str,
    pub decimals: u32,
    pub native: bool,
}

/// What a wallet needs to pay this storefront.
#[derive(Debug, Serialize)]
pub struct NetworkInfo {
    #[serde(flatten)]
    pub network: NetworkConfig,
    pub currencies: Vec<CurrencyInfo>,
}

/// `GET /api/network`
pub async fn show(State(state): State<AppState>) -> Json<NetworkInfo> {
    let currencies = [Currency::Bnb, Currency::Usdt]
        .into_iter()
        .map(|currency| CurrencyInfo {
            code: currency.code(),
            decimals: currency.decimals(),
            native: currency.is_native(),
        })
        .collect();

    Json(NetworkInfo {
        network: state.config().network(),
        currencies,
    })
}
