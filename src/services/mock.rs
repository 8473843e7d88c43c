//! Scripted service doubles for worker tests.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::transfer::{CirxTransferService, TransferOutcome, TransferServiceError};
use super::verification::{PaymentVerificationService, VerificationError, VerificationVerdict};
use crate::protocol::codec;
use crate::swap::{PaymentToken, SwapId, TransactionRecord};

#[derive(Debug, Clone)]
pub enum MockVerification {
    Valid,
    Invalid(String),
    Fail(VerificationError),
    /// Sleep this long before answering valid
    Hang(Duration),
}

pub struct MockVerifier {
    script: Mutex<VecDeque<MockVerification>>,
    fallback: Mutex<MockVerification>,
    calls: AtomicUsize,
}

impl MockVerifier {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(MockVerification::Valid),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer used once the script is exhausted
    pub fn always(&self, outcome: MockVerification) {
        *self.fallback.lock().unwrap() = outcome;
    }

    pub fn push(&self, outcome: MockVerification) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentVerificationService for MockVerifier {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn verify(
        &self,
        _record: &TransactionRecord,
    ) -> Result<VerificationVerdict, VerificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        let outcome = next.unwrap_or_else(|| self.fallback.lock().unwrap().clone());

        match outcome {
            MockVerification::Valid => Ok(VerificationVerdict::valid()),
            MockVerification::Invalid(reason) => Ok(VerificationVerdict::invalid(reason)),
            MockVerification::Fail(e) => Err(e),
            MockVerification::Hang(delay) => {
                tokio::time::sleep(delay).await;
                Ok(VerificationVerdict::valid())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum MockTransfer {
    Success(String),
    Rejected(String),
    Fail(TransferServiceError),
    Hang(Duration),
    /// Sleep, then report success; the ledger accepts the transfer
    SlowSuccess(Duration, String),
}

pub struct MockTransferService {
    script: Mutex<VecDeque<MockTransfer>>,
    fallback: Mutex<MockTransfer>,
    calls: AtomicUsize,
    transferred: Mutex<Vec<SwapId>>,
}

impl MockTransferService {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(MockTransfer::Success("0xabc123".to_string())),
            calls: AtomicUsize::new(0),
            transferred: Mutex::new(Vec::new()),
        }
    }

    pub fn always(&self, outcome: MockTransfer) {
        *self.fallback.lock().unwrap() = outcome;
    }

    pub fn push(&self, outcome: MockTransfer) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Records that received a successful transfer, in call order
    pub fn transferred(&self) -> Vec<SwapId> {
        self.transferred.lock().unwrap().clone()
    }
}

#[async_trait]
impl CirxTransferService for MockTransferService {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn transfer(
        &self,
        record: &TransactionRecord,
    ) -> Result<TransferOutcome, TransferServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        let outcome = next.unwrap_or_else(|| self.fallback.lock().unwrap().clone());

        match outcome {
            MockTransfer::Success(tx_id) => {
                self.transferred.lock().unwrap().push(record.id);
                Ok(TransferOutcome::completed(tx_id))
            }
            MockTransfer::Rejected(message) => Ok(TransferOutcome::rejected(message)),
            MockTransfer::Fail(e) => Err(e),
            MockTransfer::Hang(delay) => {
                tokio::time::sleep(delay).await;
                Ok(TransferOutcome::rejected("hung call returned late"))
            }
            MockTransfer::SlowSuccess(delay, tx_id) => {
                tokio::time::sleep(delay).await;
                self.transferred.lock().unwrap().push(record.id);
                Ok(TransferOutcome::completed(tx_id))
            }
        }
    }

    fn validate_recipient_address(&self, address: &str) -> bool {
        codec::is_valid_address(address)
    }

    fn compute_settlement_amount(
        &self,
        amount_paid: Decimal,
        _token: PaymentToken,
    ) -> Result<Decimal, TransferServiceError> {
        Ok(amount_paid)
    }
}
