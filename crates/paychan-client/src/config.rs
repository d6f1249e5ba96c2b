//! Client configuration.

use paychan_channel::{CONTRACT_ACCOUNT_ID_MAINNET, CONTRACT_ACCOUNT_ID_TESTNET, HARD_CLOSE_TIMEOUT};
use paychan_types::{AccountId, GAS_PER_TERA, Gas};

/// Gas attached to `open_channel`.
pub const DEFAULT_OPEN_GAS: Gas = Gas::from_gas(40 * GAS_PER_TERA);

/// Gas attached to every other contract call.
pub const DEFAULT_CALL_GAS: Gas = Gas::from_gas(100 * GAS_PER_TERA);

/// NEAR network the contract lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    /// Account of the payment channel contract on this network.
    pub fn contract_account_id(&self) -> AccountId {
        match self {
            Network::Mainnet => AccountId::new_unchecked(CONTRACT_ACCOUNT_ID_MAINNET),
            Network::Testnet => AccountId::new_unchecked(CONTRACT_ACCOUNT_ID_TESTNET),
        }
    }
}

/// Configuration for [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub network: Network,

    /// Contract receiving every channel call.
    pub contract_account_id: AccountId,

    pub open_gas: Gas,

    pub call_gas: Gas,

    /// Dispute window in nanoseconds of chain time. Must match the contract.
    pub dispute_window: u64,
}

impl ClientConfig {
    /// Create a new configuration with default settings (mainnet).
    pub fn new() -> Self {
        Self::default()
    }

    /// Default configuration for `network`.
    pub fn for_network(network: Network) -> Self {
        Self {
            network,
            contract_account_id: network.contract_account_id(),
            open_gas: DEFAULT_OPEN_GAS,
            call_gas: DEFAULT_CALL_GAS,
            dispute_window: HARD_CLOSE_TIMEOUT,
        }
    }

    /// Use a contract deployed at a different account.
    pub fn with_contract_account_id(mut self, contract_account_id: AccountId) -> Self {
        self.contract_account_id = contract_account_id;
        self
    }

    pub fn with_open_gas(mut self, gas: Gas) -> Self {
        self.open_gas = gas;
        self
    }

    pub fn with_call_gas(mut self, gas: Gas) -> Self {
        self.call_gas = gas;
        self
    }

    pub fn with_dispute_window(mut self, nanos: u64) -> Self {
        self.dispute_window = nanos;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::for_network(Network::Mainnet)
    }
}
