//! Connection to the Flare ledger: contract resolution, fee lookup, request
//! submission and voting-round bookkeeping.

use std::{
    fmt,
    time::Duration,
};

use alloy::{
    network::{
        EthereumWallet,
        TransactionBuilder,
    },
    primitives::{
        Address,
        B256,
        Bytes,
        U256,
    },
    providers::{
        DynProvider,
        PendingTransactionError,
        Provider,
        ProviderBuilder,
        WatchTxError,
    },
    rpc::{
        client::RpcClient,
        types::TransactionRequest,
    },
    signers::local::{
        LocalSignerError,
        PrivateKeySigner,
    },
    sol,
    sol_types::SolCall,
    transports::{
        TransportError,
        http::Http,
    },
};
use async_trait::async_trait;
use fdc_core::{
    EncodedRequest,
    RoundIdError,
    SubmissionReceipt,
    VotingEpoch,
};
use tracing::{
    debug,
    info,
};
use url::Url;

use crate::{
    finality::FinalityCheck,
    pipeline::AttestationLedger,
};

sol! {
    #[sol(rpc)]
    interface IFlareContractRegistry {
        function getContractAddressByName(string calldata _name) external view returns (address);
    }

    #[sol(rpc)]
    interface IFdcHub {
        function requestAttestation(bytes calldata _data) external payable;
    }

    #[sol(rpc)]
    interface IFdcRequestFeeConfigurations {
        function getRequestFee(bytes calldata _data) external view returns (uint256);
    }

    #[sol(rpc)]
    interface IRelay {
        function isFinalized(uint256 _protocolId, uint256 _votingRoundId) external view returns (bool);
    }

    #[sol(rpc)]
    interface IFlareSystemsManager {
        function firstVotingRoundStartTs() external view returns (uint64);
        function votingEpochDurationSeconds() external view returns (uint64);
    }
}

/// Protocol id the relay uses for FDC merkle roots.
pub const FDC_PROTOCOL_ID: u64 = 200;

/// Gas limit for `requestAttestation`.
pub const SUBMIT_GAS_LIMIT: u64 = 500_000;

/// Upper bound on one JSON-RPC round trip.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a broadcast request may stay unmined.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(120);

const FEE_CONFIGURATIONS: &str = "FdcRequestFeeConfigurations";
const RELAY: &str = "Relay";
const SYSTEMS_MANAGER: &str = "FlareSystemsManager";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no signing key configured, submitting attestations needs a funded account")]
    MissingSigningKey,
    #[error("invalid signing key: {0}")]
    InvalidSigningKey(#[from] LocalSignerError),
    #[error("failed to build RPC HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("chain gateway is not connected")]
    NotConnected,
    #[error("RPC error: {0}")]
    Rpc(#[from] TransportError),
    #[error("contract call failed: {0}")]
    Contract(#[from] alloy::contract::Error),
    #[error("transaction failed: {0}")]
    PendingTransaction(#[from] PendingTransactionError),
    #[error("transaction {tx_hash} not mined within {timeout:?}")]
    ReceiptTimeout { tx_hash: B256, timeout: Duration },
    #[error("transaction {0} reverted")]
    Reverted(B256),
    #[error("receipt for {0} has no block number")]
    MissingBlockNumber(B256),
    #[error("block {0} not found")]
    BlockNotFound(u64),
    #[error("contract registry has no {0} entry")]
    UnregisteredContract(&'static str),
    #[error("invalid voting round: {0}")]
    RoundId(#[from] RoundIdError),
}

impl GatewayError {
    /// Errors that no later cycle can recover from without operator action.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingSigningKey | Self::InvalidSigningKey(_) | Self::HttpClient(_)
        )
    }
}

#[derive(Clone)]
pub struct GatewayConfig {
    pub rpc_url: Url,
    pub contract_registry_address: Address,
    pub fdc_hub_address: Address,
    pub private_key: Option<String>,
    pub rpc_timeout: Duration,
    pub receipt_timeout: Duration,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("rpc_url", &self.rpc_url.as_str())
            .field("contract_registry_address", &self.contract_registry_address)
            .field("fdc_hub_address", &self.fdc_hub_address)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("rpc_timeout", &self.rpc_timeout)
            .field("receipt_timeout", &self.receipt_timeout)
            .finish()
    }
}

struct Connection {
    provider: DynProvider,
    sender: Address,
    fee_config: IFdcRequestFeeConfigurations::IFdcRequestFeeConfigurationsInstance<DynProvider>,
    relay: IRelay::IRelayInstance<DynProvider>,
    systems_manager: IFlareSystemsManager::IFlareSystemsManagerInstance<DynProvider>,
}

/// Signing connection to the ledger.
///
/// Built once and reused across cycles; `connect` is the only mutation.
pub struct ChainGateway {
    config: GatewayConfig,
    connection: Option<Connection>,
}

impl fmt::Debug for ChainGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainGateway")
            .field("config", &self.config)
            .field("sender", &self.sender())
            .finish()
    }
}

/// `(maxFeePerGas, maxPriorityFeePerGas)` for the current network gas price.
pub fn fee_caps(gas_price: u128) -> (u128, u128) {
    (gas_price.saturating_mul(2), gas_price)
}

/// The `requestAttestation` transaction paying `fee` for `data`. The nonce is
/// left for the provider to fill at send time.
pub fn attestation_tx(
    sender: Address,
    hub: Address,
    data: Bytes,
    fee: U256,
    gas_price: u128,
) -> TransactionRequest {
    let (max_fee_per_gas, max_priority_fee_per_gas) = fee_caps(gas_price);
    TransactionRequest::default()
        .with_from(sender)
        .with_to(hub)
        .with_input(IFdcHub::requestAttestationCall { _data: data }.abi_encode())
        .with_value(fee)
        .with_gas_limit(SUBMIT_GAS_LIMIT)
        .with_max_fee_per_gas(max_fee_per_gas)
        .with_max_priority_fee_per_gas(max_priority_fee_per_gas)
}

/// The relay query for the FDC root of `round_id`.
pub fn finality_call(round_id: u64) -> IRelay::isFinalizedCall {
    IRelay::isFinalizedCall {
        _protocolId: U256::from(FDC_PROTOCOL_ID),
        _votingRoundId: U256::from(round_id),
    }
}

/// Block a receipt was mined in, provided the transaction succeeded.
fn mined_block(
    tx_hash: B256,
    succeeded: bool,
    block_number: Option<u64>,
) -> Result<u64, GatewayError> {
    if !succeeded {
        return Err(GatewayError::Reverted(tx_hash));
    }
    block_number.ok_or(GatewayError::MissingBlockNumber(tx_hash))
}

fn receipt_error(tx_hash: B256, timeout: Duration, err: PendingTransactionError) -> GatewayError {
    match err {
        PendingTransactionError::TxWatcher(WatchTxError::Timeout) => {
            GatewayError::ReceiptTimeout { tx_hash, timeout }
        }
        other => other.into(),
    }
}

impl ChainGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            connection: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Address of the signing account, once connected.
    pub fn sender(&self) -> Option<Address> {
        self.connection.as_ref().map(|c| c.sender)
    }

    fn connection(&self) -> Result<&Connection, GatewayError> {
        self.connection.as_ref().ok_or(GatewayError::NotConnected)
    }

    /// Build the signing provider and resolve the FDC contracts.
    pub async fn connect(&mut self) -> Result<(), GatewayError> {
        let private_key = self
            .config
            .private_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or(GatewayError::MissingSigningKey)?;
        let signer: PrivateKeySigner = private_key.parse()?;
        let sender = signer.address();

        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(self.config.rpc_timeout)
            .build()
            .map_err(GatewayError::HttpClient)?;
        let transport = Http::with_client(http, self.config.rpc_url.clone());

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_client(RpcClient::new(transport, false))
            .erased();

        self.connect_with_provider(provider, sender).await
    }

    /// Resolve the FDC contracts over `provider`, whose wallet signs for
    /// `sender`.
    pub async fn connect_with_provider(
        &mut self,
        provider: DynProvider,
        sender: Address,
    ) -> Result<(), GatewayError> {
        let chain_id = provider.get_chain_id().await?;
        info!(chain_id, %sender, "Connected to Flare RPC");

        let registry =
            IFlareContractRegistry::new(self.config.contract_registry_address, provider.clone());
        let fee_config_address = resolve_contract(&registry, FEE_CONFIGURATIONS).await?;
        let relay_address = resolve_contract(&registry, RELAY).await?;
        let systems_manager_address = resolve_contract(&registry, SYSTEMS_MANAGER).await?;

        self.connection = Some(Connection {
            fee_config: IFdcRequestFeeConfigurations::new(fee_config_address, provider.clone()),
            relay: IRelay::new(relay_address, provider.clone()),
            systems_manager: IFlareSystemsManager::new(systems_manager_address, provider.clone()),
            provider,
            sender,
        });

        info!(
            fdc_hub = %self.config.fdc_hub_address,
            fee_config = %fee_config_address,
            relay = %relay_address,
            systems_manager = %systems_manager_address,
            "FDC contracts resolved"
        );
        Ok(())
    }

    /// Pay the request fee, submit `request` to the hub and wait for the
    /// receipt. Fee and gas price are read fresh on every call.
    pub async fn submit(&self, request: &EncodedRequest) -> Result<SubmissionReceipt, GatewayError> {
        let conn = self.connection()?;
        let data = request.bytes().clone();

        let fee = conn.fee_config.getRequestFee(data.clone()).call().await?;
        let gas_price = conn.provider.get_gas_price().await?;
        debug!(%fee, gas_price, "Attestation fee");

        let tx = attestation_tx(conn.sender, self.config.fdc_hub_address, data, fee, gas_price);
        let pending = conn.provider.send_transaction(tx).await?;
        let tx_hash = *pending.tx_hash();
        info!(%tx_hash, %fee, "Attestation request broadcast");

        let timeout = self.config.receipt_timeout;
        let receipt = pending
            .with_timeout(Some(timeout))
            .get_receipt()
            .await
            .map_err(|err| receipt_error(tx_hash, timeout, err))?;
        let block_number = mined_block(tx_hash, receipt.status(), receipt.block_number)?;

        let (block_timestamp, round_id) = self.round_at_block(block_number).await?;

        info!(%tx_hash, block_number, block_timestamp, round_id, "Attestation request mined");
        Ok(SubmissionReceipt {
            tx_hash,
            block_timestamp,
            round_id,
        })
    }

    /// `(timestamp, voting round id)` of `block_number`.
    async fn round_at_block(&self, block_number: u64) -> Result<(u64, u64), GatewayError> {
        let conn = self.connection()?;
        let block = conn
            .provider
            .get_block_by_number(block_number.into())
            .await?
            .ok_or(GatewayError::BlockNotFound(block_number))?;
        let block_timestamp = block.header.timestamp;

        let epoch = VotingEpoch::new(
            conn.systems_manager.firstVotingRoundStartTs().call().await?,
            conn.systems_manager
                .votingEpochDurationSeconds()
                .call()
                .await?,
        );
        Ok((block_timestamp, epoch.round_id_at(block_timestamp)?))
    }

    /// Whether the relay holds a finalized FDC root for `round_id`.
    pub async fn is_round_finalized(&self, round_id: u64) -> Result<bool, GatewayError> {
        let conn = self.connection()?;
        let finalized = conn
            .relay
            .call_builder(&finality_call(round_id))
            .call()
            .await?;
        Ok(finalized)
    }
}

async fn resolve_contract(
    registry: &IFlareContractRegistry::IFlareContractRegistryInstance<DynProvider>,
    name: &'static str,
) -> Result<Address, GatewayError> {
    let address = registry
        .getContractAddressByName(name.to_string())
        .call()
        .await?;
    if address.is_zero() {
        return Err(GatewayError::UnregisteredContract(name));
    }
    debug!(name, %address, "Resolved contract");
    Ok(address)
}

#[async_trait]
impl FinalityCheck for ChainGateway {
    async fn is_round_finalized(&self, round_id: u64) -> Result<bool, GatewayError> {
        ChainGateway::is_round_finalized(self, round_id).await
    }
}

#[async_trait]
impl AttestationLedger for ChainGateway {
    fn is_connected(&self) -> bool {
        ChainGateway::is_connected(self)
    }

    async fn connect(&mut self) -> Result<(), GatewayError> {
        ChainGateway::connect(self).await
    }

    async fn submit(&self, request: &EncodedRequest) -> Result<SubmissionReceipt, GatewayError> {
        ChainGateway::submit(self, request).await
    }
}
