//! Scripted in-memory provider for unit tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy::primitives::{Address, Bytes, Selector, B256};
use alloy::rpc::types::TransactionRequest;
use alloy_dyn_abi::{DynSolValue, FunctionExt};
use alloy_json_abi::Function;
use anyhow::{anyhow, Result};
use tokio::sync::mpsc;

use crate::infrastructure::ethereum::{BlockSubscription, EthereumProvider, NodeRejection};

#[derive(Debug, Clone)]
pub enum MockReply {
    Data(Bytes),
    Rejected(String),
    Transport(String),
}

impl MockReply {
    fn into_result<T>(self, ok: impl FnOnce(Bytes) -> T) -> Result<T> {
        match self {
            MockReply::Data(bytes) => Ok(ok(bytes)),
            MockReply::Rejected(message) => Err(anyhow::Error::new(NodeRejection {
                code: -32000,
                message,
            })),
            MockReply::Transport(message) => Err(anyhow!(message)),
        }
    }
}

#[derive(Default)]
pub struct MockProvider {
    calls: Mutex<HashMap<Selector, MockReply>>,
    send_reply: Mutex<Option<MockReply>>,
    blocks: Vec<Vec<B256>>,
    failing_blocks: Vec<usize>,
    accounts: Vec<Address>,
    keep_streams_open: bool,
    automine: bool,
    failing_accounts: bool,
    mined: Mutex<Vec<B256>>,
    open_streams: Mutex<Vec<mpsc::Sender<B256>>>,
    pub call_log: Mutex<Vec<(Option<Address>, Selector)>>,
    pub sent: Mutex<Vec<TransactionRequest>>,
    pub unsubscribes: Arc<AtomicUsize>,
    pub subscriptions: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            accounts: vec![Address::repeat_byte(0x11)],
            ..Default::default()
        }
    }

    /// Reply to calls of `function` with the given decoded outputs
    pub fn with_output(self, function: &Function, outputs: &[DynSolValue]) -> Self {
        let data = function.abi_encode_output(outputs).expect("encodable outputs");
        self.with_call(function.selector(), MockReply::Data(data.into()))
    }

    pub fn with_call(self, selector: Selector, reply: MockReply) -> Self {
        self.set_call(selector, reply);
        self
    }

    /// Change a scripted reply after the provider was handed out
    pub fn set_call(&self, selector: Selector, reply: MockReply) {
        self.calls.lock().unwrap().insert(selector, reply);
    }

    pub fn with_send(self, reply: MockReply) -> Self {
        *self.send_reply.lock().unwrap() = Some(reply);
        self
    }

    /// Blocks delivered to each subscription, as transaction hash lists.
    /// The stream ends after the last one.
    pub fn with_blocks(mut self, blocks: Vec<Vec<B256>>) -> Self {
        self.blocks = blocks;
        self
    }

    /// Block lookups at these indices fail
    pub fn with_failing_blocks(mut self, indices: Vec<usize>) -> Self {
        self.failing_blocks = indices;
        self
    }

    /// Block streams stay open after the scripted blocks instead of ending
    pub fn with_open_streams(mut self) -> Self {
        self.keep_streams_open = true;
        self
    }

    /// Every accepted transaction is mined into a fresh block right away,
    /// announced only to watches that are open at that moment
    pub fn with_automine(mut self) -> Self {
        self.automine = true;
        self.keep_streams_open = true;
        self
    }

    /// eth_accounts answers with an error
    pub fn with_failing_accounts(mut self) -> Self {
        self.failing_accounts = true;
        self
    }

    pub fn with_accounts(mut self, accounts: Vec<Address>) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }

    pub fn block_hash(index: usize) -> B256 {
        B256::left_padding_from(&(index as u64 + 1).to_be_bytes())
    }

    fn block_index(hash: B256) -> usize {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash[24..]);
        u64::from_be_bytes(bytes) as usize - 1
    }
}

#[async_trait::async_trait]
impl EthereumProvider for MockProvider {
    async fn block_number(&self) -> Result<u64> {
        Ok(self.blocks.len() as u64)
    }

    async fn client_version(&self) -> Result<String> {
        Ok("mock/v1.0.0".to_string())
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        if self.failing_accounts {
            return Err(anyhow::Error::new(NodeRejection {
                code: -32601,
                message: "the method eth_accounts does not exist".into(),
            }));
        }
        Ok(self.accounts.clone())
    }

    async fn call(&self, request: TransactionRequest) -> Result<Bytes> {
        let input = request.input.input().cloned().unwrap_or_default();
        let selector = Selector::from_slice(&input[..4]);
        self.call_log
            .lock()
            .unwrap()
            .push((request.to.and_then(|to| to.to().copied()), selector));

        let reply = self.calls.lock().unwrap().get(&selector).cloned();
        match reply {
            Some(reply) => reply.into_result(|bytes| bytes),
            None => Ok(Bytes::new()),
        }
    }

    async fn send_transaction(&self, request: TransactionRequest) -> Result<B256> {
        self.sent.lock().unwrap().push(request);
        let reply = self.send_reply.lock().unwrap().clone();
        let tx_hash = match reply {
            Some(reply) => reply.into_result(|bytes| B256::right_padding_from(&bytes))?,
            None => B256::repeat_byte(0x77),
        };

        if self.automine {
            let block = {
                let mut mined = self.mined.lock().unwrap();
                mined.push(tx_hash);
                Self::block_hash(self.blocks.len() + mined.len() - 1)
            };
            for stream in self.open_streams.lock().unwrap().iter() {
                let _ = stream.try_send(block);
            }
        }
        Ok(tx_hash)
    }

    async fn block_transactions(&self, hash: B256) -> Result<Option<Vec<B256>>> {
        let index = Self::block_index(hash);
        if self.failing_blocks.contains(&index) {
            return Err(anyhow!("block {} unavailable", index));
        }
        if let Some(txs) = self.blocks.get(index) {
            return Ok(Some(txs.clone()));
        }
        let mined = self.mined.lock().unwrap();
        Ok(mined.get(index - self.blocks.len()).map(|tx| vec![*tx]))
    }

    async fn watch_blocks(&self) -> Result<BlockSubscription> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(self.blocks.len() + 8);
        for index in 0..self.blocks.len() {
            tx.try_send(Self::block_hash(index))?;
        }
        if self.keep_streams_open {
            self.open_streams.lock().unwrap().push(tx);
        }
        let unsubscribes = self.unsubscribes.clone();
        Ok(BlockSubscription::new(rx, move || {
            unsubscribes.fetch_add(1, Ordering::SeqCst);
        }))
    }

    fn endpoint_name(&self) -> String {
        "mock://node".to_string()
    }
}
