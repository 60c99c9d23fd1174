//! Gateway session - one node connection and at most one active contract

use std::sync::Arc;
use std::time::Duration;

use alloy::network::TransactionBuilder;
use alloy::primitives::Address;
use alloy::rpc::types::TransactionRequest;
use alloy_dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy_json_abi::Function;
use tracing::{debug, info, warn};

use crate::domain::abi::{
    coerce_args, is_falsy, is_read_only, value_text, CodecError, InterfaceDescriptors,
};
use crate::gateway::{
    ActiveContract, ContractHandle, GatewayError, SendOptions, TransactionSubmission,
};
use crate::infrastructure::abi::{load_descriptors, DescriptorSource};
use crate::infrastructure::ethereum::{create_provider, EthereumProvider, ProviderConfig};
use crate::poller::{Confirmation, ConfirmationPoller, DEFAULT_CONFIRMATION_BUDGET};

/// Result of the explicit readiness check
#[derive(Debug, Clone)]
pub struct NodeStatus {
    pub endpoint: String,
    pub client_version: String,
    pub head_block: u64,
    pub accounts: Vec<Address>,
}

/// Connection to one node plus the contract currently in use.
///
/// Rebinding replaces the active contract; business calls only ever reach
/// the active one.
pub struct Session {
    provider: Arc<dyn EthereumProvider>,
    descriptors: Option<InterfaceDescriptors>,
    active: Option<ActiveContract>,
    sender: Option<Address>,
    confirmation_budget: u32,
}

impl Session {
    pub fn new(provider: Arc<dyn EthereumProvider>) -> Self {
        Self {
            provider,
            descriptors: None,
            active: None,
            sender: None,
            confirmation_budget: DEFAULT_CONFIRMATION_BUDGET,
        }
    }

    /// Open a transport to `config`. Nothing is sent to the node yet; use
    /// [`Session::check_ready`] to find out whether it answers.
    pub async fn connect(
        config: ProviderConfig,
        poll_interval: Duration,
    ) -> Result<Self, GatewayError> {
        let provider = create_provider(config, poll_interval)
            .await
            .map_err(GatewayError::communication)?;
        Ok(Self::new(provider))
    }

    /// Send transactions from this account instead of the node's first one
    pub fn with_sender(mut self, sender: Address) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Number of blocks the confirmation poller waits for
    pub fn with_confirmation_budget(mut self, budget: u32) -> Self {
        self.confirmation_budget = budget;
        self
    }

    pub fn confirmation_budget(&self) -> u32 {
        self.confirmation_budget
    }

    /// Probe the node: client version and head block. Unlocked accounts are
    /// listed when the node allows it.
    pub async fn check_ready(&self) -> Result<NodeStatus, GatewayError> {
        let endpoint = self.provider.endpoint_name();
        let client_version = self
            .provider
            .client_version()
            .await
            .map_err(GatewayError::communication)?;
        let head_block = self
            .provider
            .block_number()
            .await
            .map_err(GatewayError::communication)?;
        // Accounts are informational, a node may refuse eth_accounts
        let accounts = match self.provider.accounts().await {
            Ok(accounts) => accounts,
            Err(err) => {
                warn!(%endpoint, error = %format!("{:#}", err), "account listing unavailable");
                Vec::new()
            }
        };

        info!(%endpoint, %client_version, head_block, "node is reachable");
        Ok(NodeStatus {
            endpoint,
            client_version,
            head_block,
            accounts,
        })
    }

    /// Load interface descriptors. On failure the session drops any
    /// previously loaded descriptors and active contract, and contract
    /// operations report `NotReady` until a load succeeds.
    pub async fn load_descriptors(
        &mut self,
        source: &DescriptorSource,
    ) -> Result<&InterfaceDescriptors, GatewayError> {
        match load_descriptors(source).await {
            Ok(descriptors) => Ok(self.set_descriptors(descriptors)),
            Err(err) => {
                warn!(%source, error = %format!("{:#}", err), "descriptor load failed");
                self.descriptors = None;
                self.active = None;
                Err(GatewayError::DescriptorLoad(format!("{:#}", err)))
            }
        }
    }

    pub fn set_descriptors(&mut self, descriptors: InterfaceDescriptors) -> &InterfaceDescriptors {
        self.descriptors.insert(descriptors)
    }

    pub fn descriptors(&self) -> Result<&InterfaceDescriptors, GatewayError> {
        self.descriptors.as_ref().ok_or(GatewayError::NotReady)
    }

    /// Bind the named descriptor to a deployed address. The handle is not
    /// usable for business calls until verified and activated.
    pub fn bind_contract(
        &self,
        name: &str,
        address: Address,
    ) -> Result<ContractHandle, GatewayError> {
        let descriptor = self
            .descriptors()?
            .get(name)
            .ok_or_else(|| GatewayError::UnknownDescriptor(name.to_string()))?;
        Ok(ContractHandle::new(address, descriptor))
    }

    /// Call the contract's `version()` and require a non-empty answer
    pub async fn verify(&self, handle: &ContractHandle) -> Result<String, GatewayError> {
        let values = match self.call_on(handle, "version", &[]).await {
            Ok(values) => values,
            Err(GatewayError::CallRejected(message)) => {
                return Err(GatewayError::Communication(message))
            }
            Err(err) => return Err(err),
        };

        match values.first() {
            Some(value) if !is_falsy(&values) => Ok(value_text(value)),
            _ => {
                warn!(address = %handle.address(), "contract returned an empty version");
                Err(GatewayError::InvalidContract {
                    address: handle.address(),
                })
            }
        }
    }

    /// Bind, verify and publish a contract as the active one.
    ///
    /// On failure the previously active contract, if any, stays active.
    pub async fn activate(
        &mut self,
        name: &str,
        address: Address,
    ) -> Result<&ActiveContract, GatewayError> {
        let handle = self.bind_contract(name, address)?;
        let version = self.verify(&handle).await?;

        if let Some(previous) = &self.active {
            debug!(previous = %previous.handle.address(), "replacing active contract");
        }
        info!(%address, contract = name, %version, "contract activated");
        Ok(&*self.active.insert(ActiveContract { handle, version }))
    }

    pub fn active(&self) -> Option<&ActiveContract> {
        self.active.as_ref()
    }

    fn active_handle(&self) -> Result<&ContractHandle, GatewayError> {
        self.descriptors()?;
        self.active
            .as_ref()
            .map(|active| &active.handle)
            .ok_or(GatewayError::NoActiveContract)
    }

    /// Invoke a read-only method on the active contract
    pub async fn call(
        &self,
        method: &str,
        args: &[&str],
    ) -> Result<Vec<DynSolValue>, GatewayError> {
        let handle = self.active_handle()?;
        self.call_on(handle, method, args).await
    }

    /// Submit a state-mutating call to the active contract. Returns as soon
    /// as the node accepted the transaction.
    pub async fn send(
        &self,
        method: &str,
        args: &[&str],
        options: SendOptions,
    ) -> Result<TransactionSubmission, GatewayError> {
        let handle = self.active_handle()?;
        let function = handle.method(method, args.len())?;
        if is_read_only(function) {
            warn!(method, "sending a transaction to a read-only method");
        }
        let calldata = encode_call(function, args)?;
        let from = self.sender().await?;

        let mut request = TransactionRequest::default()
            .with_from(from)
            .with_to(handle.address())
            .with_input(calldata)
            .with_gas_limit(options.gas_limit);
        if let Some(value) = options.value {
            request = request.with_value(value);
        }

        let tx_hash = self
            .provider
            .send_transaction(request)
            .await
            .map_err(GatewayError::from_submission)?;

        info!(%tx_hash, method, contract = %handle.address(), "transaction submitted");
        Ok(TransactionSubmission {
            tx_hash,
            contract: handle.address(),
            method: method.to_string(),
        })
    }

    /// Poller bound to this session's node and budget
    pub fn poller(&self) -> ConfirmationPoller {
        ConfirmationPoller::new(self.provider.clone(), self.confirmation_budget)
    }

    /// Submit and wait until the transaction is included or the budget
    /// runs out. The block watch is opened before submitting.
    pub async fn send_and_confirm(
        &self,
        method: &str,
        args: &[&str],
        options: SendOptions,
    ) -> Result<(TransactionSubmission, Confirmation), GatewayError> {
        let armed = self.poller().arm().await?;
        let submission = self.send(method, args, options).await?;
        let confirmation = armed.wait(submission.tx_hash).await?;
        Ok((submission, confirmation))
    }

    async fn call_on(
        &self,
        handle: &ContractHandle,
        method: &str,
        args: &[&str],
    ) -> Result<Vec<DynSolValue>, GatewayError> {
        let function = handle.method(method, args.len())?;
        let calldata = encode_call(function, args)?;

        let mut request = TransactionRequest::default()
            .with_to(handle.address())
            .with_input(calldata);
        if let Some(from) = self.sender {
            request = request.with_from(from);
        }

        debug!(method, contract = %handle.address(), "eth_call");
        let output = self
            .provider
            .call(request)
            .await
            .map_err(GatewayError::from_call)?;

        // No code at the address answers every call with empty data
        if output.is_empty() && !function.outputs.is_empty() {
            return Err(GatewayError::InvalidContract {
                address: handle.address(),
            });
        }

        function.abi_decode_output(&output).map_err(|err| {
            GatewayError::Communication(format!("undecodable {} result: {}", method, err))
        })
    }

    async fn sender(&self) -> Result<Address, GatewayError> {
        if let Some(sender) = self.sender {
            return Ok(sender);
        }
        let accounts = self
            .provider
            .accounts()
            .await
            .map_err(GatewayError::communication)?;
        accounts.first().copied().ok_or_else(|| {
            GatewayError::SubmissionRejected("node has no unlocked account to send from".into())
        })
    }
}

fn encode_call(function: &Function, args: &[&str]) -> Result<Vec<u8>, GatewayError> {
    let values = coerce_args(function, args)?;
    function
        .abi_encode_input(&values)
        .map_err(|err| GatewayError::InvalidArgument(CodecError::Encode(err.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ethereum::mock::{MockProvider, MockReply};
    use alloy::primitives::{B256, U256};

    const CONTRACTS: &str = include_str!("../../tests/fixtures/contracts.json");
    const REGISTRY: &str = "EInvoicingRegistry";

    fn descriptors() -> InterfaceDescriptors {
        InterfaceDescriptors::from_json(CONTRACTS).unwrap()
    }

    fn function(name: &str) -> Function {
        descriptors()
            .get(REGISTRY)
            .unwrap()
            .methods(name)
            .first()
            .cloned()
            .unwrap()
    }

    fn new_session(provider: MockProvider) -> (Session, Arc<MockProvider>) {
        let provider = Arc::new(provider);
        let mut session = Session::new(provider.clone());
        session.set_descriptors(descriptors());
        (session, provider)
    }

    fn versioned(version: &str) -> MockProvider {
        MockProvider::new().with_output(
            &function("version"),
            &[DynSolValue::String(version.to_string())],
        )
    }

    #[tokio::test]
    async fn test_operations_before_descriptors_are_not_ready() {
        let session = Session::new(Arc::new(MockProvider::new()));
        assert!(matches!(
            session.bind_contract(REGISTRY, Address::ZERO),
            Err(GatewayError::NotReady)
        ));
        assert!(matches!(
            session.call("version", &[]).await,
            Err(GatewayError::NotReady)
        ));
    }

    #[tokio::test]
    async fn test_failed_descriptor_load_resets_session() {
        let (mut session, _) = new_session(versioned("0.1"));
        session
            .activate(REGISTRY, Address::repeat_byte(1))
            .await
            .unwrap();

        let missing = DescriptorSource::Path("/nonexistent/eireg/contracts.json".into());
        assert!(matches!(
            session.load_descriptors(&missing).await,
            Err(GatewayError::DescriptorLoad(_))
        ));
        assert!(session.active().is_none());
        assert!(matches!(
            session.call("version", &[]).await,
            Err(GatewayError::NotReady)
        ));
    }

    #[tokio::test]
    async fn test_unknown_descriptor() {
        let (session, _) = new_session(MockProvider::new());
        assert!(matches!(
            session.bind_contract("Registry", Address::ZERO),
            Err(GatewayError::UnknownDescriptor(name)) if name == "Registry"
        ));
    }

    #[tokio::test]
    async fn test_verify_accepts_version() {
        let (mut session, _) = new_session(versioned("0.1"));
        let active = session
            .activate(REGISTRY, Address::repeat_byte(1))
            .await
            .unwrap();
        assert_eq!(active.version, "0.1");
        assert_eq!(active.handle.address(), Address::repeat_byte(1));
    }

    #[tokio::test]
    async fn test_empty_version_is_invalid_and_not_published() {
        let (mut session, _) = new_session(versioned(""));
        let err = session
            .activate(REGISTRY, Address::repeat_byte(0xab))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidContract { .. }));
        assert!(session.active().is_none());
        assert!(matches!(
            session.call("version", &[]).await,
            Err(GatewayError::NoActiveContract)
        ));
    }

    #[tokio::test]
    async fn test_no_code_at_address_is_invalid() {
        // Unscripted calls answer with empty data
        let (session, _) = new_session(MockProvider::new());
        let handle = session
            .bind_contract(REGISTRY, Address::repeat_byte(2))
            .unwrap();
        assert!(matches!(
            session.verify(&handle).await,
            Err(GatewayError::InvalidContract { .. })
        ));
    }

    #[tokio::test]
    async fn test_verify_maps_failures_to_communication() {
        let selector = function("version").selector();
        for reply in [
            MockReply::Transport("timeout".into()),
            MockReply::Rejected("execution reverted".into()),
        ] {
            let (session, _) = new_session(MockProvider::new().with_call(selector, reply));
            let handle = session
                .bind_contract(REGISTRY, Address::repeat_byte(3))
                .unwrap();
            assert!(matches!(
                session.verify(&handle).await,
                Err(GatewayError::Communication(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_failed_activation_keeps_previous_contract() {
        let selector = function("version").selector();
        let (mut session, provider) = new_session(versioned("0.1"));
        session
            .activate(REGISTRY, Address::repeat_byte(1))
            .await
            .unwrap();

        provider.set_call(selector, MockReply::Transport("down".into()));
        assert!(session
            .activate(REGISTRY, Address::repeat_byte(2))
            .await
            .is_err());
        assert_eq!(
            session.active().unwrap().handle.address(),
            Address::repeat_byte(1)
        );
    }

    #[tokio::test]
    async fn test_rebinding_replaces_active_contract() {
        let (mut session, provider) = new_session(versioned("0.1"));
        let old = Address::repeat_byte(1);
        let new = Address::repeat_byte(2);

        session.activate(REGISTRY, old).await.unwrap();
        session.activate(REGISTRY, new).await.unwrap();
        session.call("version", &[]).await.unwrap();

        let log = provider.call_log.lock().unwrap();
        assert_eq!(log.last().unwrap().0, Some(new));
        assert_eq!(session.active().unwrap().handle.address(), new);
    }

    #[tokio::test]
    async fn test_call_unknown_method() {
        let (mut session, _) = new_session(versioned("0.1"));
        session
            .activate(REGISTRY, Address::repeat_byte(1))
            .await
            .unwrap();
        assert!(matches!(
            session.call("selfDestruct", &[]).await,
            Err(GatewayError::MethodNotFound(_))
        ));
        assert!(matches!(
            session.call("getData", &[]).await,
            Err(GatewayError::MethodNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_call_decodes_padded_identifier() {
        let vat = B256::right_padding_from(b"FI12345678");
        let provider = versioned("0.1").with_output(
            &function("getVatIdByAddress"),
            &[DynSolValue::FixedBytes(vat, 32)],
        );
        let (mut session, _) = new_session(provider);
        session
            .activate(REGISTRY, Address::repeat_byte(1))
            .await
            .unwrap();

        let values = session
            .call("getVatIdByAddress", &["OVT:3705090754"])
            .await
            .unwrap();
        assert_eq!(value_text(&values[0]), "FI12345678");
    }

    #[tokio::test]
    async fn test_send_builds_transaction() {
        let (mut session, provider) = new_session(versioned("0.1"));
        session
            .activate(REGISTRY, Address::repeat_byte(1))
            .await
            .unwrap();

        let options = SendOptions {
            value: Some(U256::from(5)),
            gas_limit: 200_000,
        };
        let submission = session
            .send("updateData", &["OVT:123", "{\"name\":\"x\"}"], options)
            .await
            .unwrap();
        assert_eq!(submission.tx_hash, B256::repeat_byte(0x77));
        assert_eq!(submission.method, "updateData");

        let sent = provider.sent.lock().unwrap();
        let request = &sent[0];
        assert_eq!(request.from, Some(Address::repeat_byte(0x11)));
        assert_eq!(request.gas, Some(200_000));
        assert_eq!(request.value, Some(U256::from(5)));

        let input = request.input.input().unwrap();
        assert_eq!(&input[..4], function("updateData").selector().as_slice());
        // First argument word is the NUL padded key
        assert_eq!(&input[4..11], b"OVT:123");
        assert!(input[11..36].iter().all(|b| *b == 0));
    }

    #[tokio::test]
    async fn test_send_rejected_by_node() {
        let provider =
            versioned("0.1").with_send(MockReply::Rejected("invalid sender".into()));
        let (mut session, _) = new_session(provider);
        session
            .activate(REGISTRY, Address::repeat_byte(1))
            .await
            .unwrap();
        assert!(matches!(
            session
                .send("createCompany", &["FI12345678"], SendOptions::default())
                .await,
            Err(GatewayError::SubmissionRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_send_over_long_identifier() {
        let (mut session, provider) = new_session(versioned("0.1"));
        session
            .activate(REGISTRY, Address::repeat_byte(1))
            .await
            .unwrap();
        let long = "X".repeat(33);
        assert!(matches!(
            session
                .send("createCompany", &[long.as_str()], SendOptions::default())
                .await,
            Err(GatewayError::InvalidArgument(_))
        ));
        assert!(provider.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_without_accounts() {
        let provider = versioned("0.1").with_accounts(Vec::new());
        let (mut session, _) = new_session(provider);
        session
            .activate(REGISTRY, Address::repeat_byte(1))
            .await
            .unwrap();
        assert!(matches!(
            session
                .send("createCompany", &["FI1"], SendOptions::default())
                .await,
            Err(GatewayError::SubmissionRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_check_ready() {
        let (session, _) = new_session(MockProvider::new());
        let status = session.check_ready().await.unwrap();
        assert_eq!(status.client_version, "mock/v1.0.0");
        assert_eq!(status.accounts.len(), 1);
    }

    #[tokio::test]
    async fn test_send_and_confirm_on_automining_node() {
        let (mut session, provider) = new_session(versioned("0.1").with_automine());
        session
            .activate(REGISTRY, Address::repeat_byte(1))
            .await
            .unwrap();

        let (submission, confirmation) = tokio::time::timeout(
            Duration::from_secs(5),
            session.send_and_confirm("createCompany", &["FI12345678"], SendOptions::default()),
        )
        .await
        .expect("confirmation must not hang")
        .unwrap();

        assert_eq!(submission.tx_hash, B256::repeat_byte(0x77));
        assert_eq!(
            confirmation,
            Confirmation::Confirmed {
                block_hash: MockProvider::block_hash(0),
                blocks_observed: 1,
            }
        );
        assert_eq!(provider.unsubscribe_count(), 1);
    }

    #[tokio::test]
    async fn test_rejected_send_releases_block_watch() {
        let provider = versioned("0.1").with_send(MockReply::Rejected("nonce too low".into()));
        let (mut session, provider) = new_session(provider);
        session
            .activate(REGISTRY, Address::repeat_byte(1))
            .await
            .unwrap();

        assert!(matches!(
            session
                .send_and_confirm("createCompany", &["FI1"], SendOptions::default())
                .await,
            Err(GatewayError::SubmissionRejected(_))
        ));
        assert_eq!(provider.unsubscribe_count(), 1);
    }

    #[tokio::test]
    async fn test_check_ready_without_accounts_listing() {
        let provider = MockProvider::new().with_failing_accounts();
        let (session, _) = new_session(provider);
        let status = session.check_ready().await.unwrap();
        assert_eq!(status.head_block, 0);
        assert!(status.accounts.is_empty());
    }
}
