//! A [`PaymentProvider`] backed by a MoneroPay instance over its HTTP API.
use std::sync::Arc;

use escrow_engine::{
    traits::{Destination, InvoiceStatusReport, PaymentProvider, ProviderError, TransferReceipt, TransferStatusReport},
    Piconero,
};
use log::*;
use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

const INVOICE_DESCRIPTION: &str = "invoice";

#[derive(Clone)]
pub struct MoneroPayClient {
    url: String,
    client: Arc<Client>,
}

impl std::fmt::Debug for MoneroPayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MoneroPayClient ({})", self.url)
    }
}

#[derive(Debug, Serialize)]
struct ReceiveRequest<'a> {
    amount: u64,
    description: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    callback_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ReceiveResponse {
    address: String,
}

#[derive(Debug, Deserialize)]
struct ReceiveStatusResponse {
    amount: ReceiveAmount,
}

#[derive(Debug, Deserialize)]
struct ReceiveAmount {
    covered: CoveredAmount,
}

#[derive(Debug, Deserialize)]
struct CoveredAmount {
    total: u64,
    unlocked: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct TransferDestination {
    amount: u64,
    address: String,
}

#[derive(Debug, Serialize)]
struct TransferRequest {
    destinations: Vec<TransferDestination>,
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
    #[serde(default)]
    tx_hash_list: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TransferStatusResponse {
    state: String,
    confirmations: u64,
    #[serde(default)]
    destinations: Vec<TransferDestination>,
}

impl MoneroPayClient {
    pub fn new(url: &str) -> Result<Self, ProviderError> {
        let client = Client::builder().build().map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        Ok(Self { url: url.trim_end_matches('/').to_string(), client: Arc::new(client) })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.url)
    }

    /// Sends the request and checks the status. Non-success responses are turned into a [`ProviderError`].
    async fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<B>,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = self.url(path);
        trace!("🧾️ MoneroPay {method} {url}");
        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else if status == StatusCode::NOT_FOUND {
            Err(ProviderError::NotFound(path.to_string()))
        } else {
            let message = response.text().await.map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
            Err(ProviderError::InvalidResponse { status: status.as_u16(), message })
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ProviderError> {
        let response = self.send::<()>(Method::GET, path, None).await?;
        response.json::<T>().await.map_err(|e| ProviderError::DeserializationError(e.to_string()))
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: B) -> Result<T, ProviderError> {
        let response = self.send(Method::POST, path, Some(body)).await?;
        response.json::<T>().await.map_err(|e| ProviderError::DeserializationError(e.to_string()))
    }
}

fn to_atomic(amount: Piconero) -> Result<u64, ProviderError> {
    u64::try_from(amount).map_err(|e| ProviderError::InvalidAmount(e.to_string()))
}

fn from_atomic(amount: u64) -> Result<Piconero, ProviderError> {
    Piconero::try_from(amount).map_err(|e| ProviderError::DeserializationError(e.to_string()))
}

impl PaymentProvider for MoneroPayClient {
    async fn invoice(&self, amount: Piconero, callback_url: &str) -> Result<String, ProviderError> {
        let req = ReceiveRequest { amount: to_atomic(amount)?, description: INVOICE_DESCRIPTION, callback_url };
        let response = self.post::<ReceiveResponse, _>("/receive", req).await?;
        debug!("🧾️ MoneroPay assigned {} for {amount}", response.address);
        Ok(response.address)
    }

    async fn invoice_status(&self, address: &str) -> Result<InvoiceStatusReport, ProviderError> {
        let response = self.get::<ReceiveStatusResponse>(&format!("/receive/{address}")).await?;
        let covered = response.amount.covered;
        Ok(InvoiceStatusReport {
            amount_unlocked: from_atomic(covered.unlocked)?,
            amount_total: from_atomic(covered.total)?,
        })
    }

    async fn delete_invoice(&self, address: &str) -> Result<(), ProviderError> {
        self.send::<()>(Method::DELETE, &format!("/receive/{address}"), None).await?;
        trace!("🧾️ MoneroPay released {address}");
        Ok(())
    }

    async fn transfer(&self, destinations: &[Destination]) -> Result<TransferReceipt, ProviderError> {
        let destinations = destinations
            .iter()
            .map(|d| Ok(TransferDestination { amount: to_atomic(d.amount)?, address: d.address.clone() }))
            .collect::<Result<Vec<TransferDestination>, ProviderError>>()?;
        let response = self.post::<TransferResponse, _>("/transfer", TransferRequest { destinations }).await?;
        Ok(TransferReceipt { tx_hash_list: response.tx_hash_list })
    }

    async fn transfer_status(&self, tx_hash: &str) -> Result<TransferStatusReport, ProviderError> {
        let response = self.get::<TransferStatusResponse>(&format!("/transfer/{tx_hash}")).await?;
        let destinations = response
            .destinations
            .into_iter()
            .map(|d| Ok(Destination { address: d.address, amount: from_atomic(d.amount)? }))
            .collect::<Result<Vec<Destination>, ProviderError>>()?;
        Ok(TransferStatusReport {
            destinations,
            confirmations: response.confirmations,
            failed: response.state == "failed",
        })
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn receive_request_omits_empty_callback() {
        let req = ReceiveRequest { amount: 1_000, description: INVOICE_DESCRIPTION, callback_url: "" };
        assert_eq!(serde_json::to_value(&req).unwrap(), json!({"amount": 1000, "description": "invoice"}));
        let req = ReceiveRequest { amount: 5, description: INVOICE_DESCRIPTION, callback_url: "http://cb" };
        assert_eq!(serde_json::to_value(&req).unwrap()["callback_url"], "http://cb");
    }

    #[test]
    fn receive_status() {
        let body = r#"{
            "amount": {"expected": 200000000, "covered": {"total": 150000000, "unlocked": 100000000}},
            "complete": false,
            "description": "invoice",
            "created_at": "2024-05-01T10:00:00Z",
            "transactions": []
        }"#;
        let status = serde_json::from_str::<ReceiveStatusResponse>(body).unwrap();
        assert_eq!(status.amount.covered.total, 150_000_000);
        assert_eq!(status.amount.covered.unlocked, 100_000_000);
    }

    #[test]
    fn transfer_status() {
        let body = r#"{
            "amount": 1000, "fee": 10, "state": "failed", "confirmations": 3, "double_spend_seen": false,
            "destinations": [{"amount": 1000, "address": "44abc"}], "tx_hash": "ab12"
        }"#;
        let status = serde_json::from_str::<TransferStatusResponse>(body).unwrap();
        assert_eq!(status.state, "failed");
        assert_eq!(status.confirmations, 3);
        assert_eq!(status.destinations[0].address, "44abc");
    }

    #[test]
    fn negative_amounts_are_rejected() {
        assert!(matches!(to_atomic(Piconero::from(-1)), Err(ProviderError::InvalidAmount(_))));
        assert_eq!(to_atomic(Piconero::from(42)).unwrap(), 42);
        assert!(from_atomic(u64::MAX).is_err());
    }

    #[test]
    fn urls_drop_trailing_slashes() {
        let client = MoneroPayClient::new("http://localhost:5000/").unwrap();
        assert_eq!(client.url("/receive"), "http://localhost:5000/receive");
    }
}
