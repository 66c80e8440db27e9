//! # Chain registry
//!
//! Maps a [`NetworkId`] to the ordered list of stablecoins the engine accepts
//! on that network.
//!
//! The registry is an immutable value handed to whoever needs it (usually
//! through a [`NetworkView`]); tests build their own with
//! [`ChainRegistry::with_network`] instead of relying on the built-in table.
//!
//! ## Local networks
//!
//! On Foundry / Hardhat chains the configured USDC address is a placeholder.
//! Once the mock token is deployed its address is supplied by the caller and
//! [`ChainRegistry::apply_local_override`] swaps it in.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::types::{Address, NetworkId, StablecoinDescriptor};

/// Symbol of the token replaced by a deployed mock on local networks.
pub const LOCAL_MOCK_SYMBOL: &str = "USDC";
/// Name marker identifying the placeholder mock descriptor.
pub const MOCK_NAME_MARKER: &str = "Mock";

struct BuiltinCoin {
    symbol: &'static str,
    name: &'static str,
    address: Address,
    decimals: u8,
}

const fn coin(symbol: &'static str, name: &'static str, address: &str, decimals: u8) -> BuiltinCoin {
    BuiltinCoin {
        symbol,
        name,
        address: Address::from_hex_literal(address),
        decimals,
    }
}

const LOCAL_MOCK_PLACEHOLDER: &str = "0x700b6A60ce7EaaEA56F065753d8dcB9653dbAD35";

const BUILTIN: &[(NetworkId, &[BuiltinCoin])] = &[
    (
        NetworkId::MAINNET,
        &[
            coin("USDC", "USD Coin", "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", 6),
            coin("USDT", "Tether USD", "0xdAC17F958D2ee523a2206206994597C13D831ec7", 6),
            coin("DAI", "Dai Stablecoin", "0x6B175474E89094C44Da98b954EedeAC495271d0F", 18),
        ],
    ),
    (
        NetworkId::BASE,
        &[
            coin("USDC", "USD Coin", "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913", 6),
            coin("USDbC", "USD Base Coin (Bridged)", "0xd9aAEc86B65D86f6A7B5B1b0c42FFA531710b6CA", 6),
        ],
    ),
    (
        NetworkId::ARBITRUM,
        &[
            coin("USDC", "USD Coin (Arbitrum)", "0xaf88d065e77c8cC2239327C5EDb3A432268e5831", 6),
            coin("USDT", "Tether USD (Arbitrum)", "0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9", 6),
        ],
    ),
    (
        NetworkId::OPTIMISM,
        &[
            coin("USDC", "USD Coin (Optimism)", "0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85", 6),
            coin("USDT", "Tether USD (Optimism)", "0x94b008aA00579c1307B0EF2c499aD98a8ce58e58", 6),
        ],
    ),
    (
        NetworkId::POLYGON,
        &[
            coin("USDC", "USD Coin (Polygon)", "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174", 6),
            coin("USDT", "Tether USD (Polygon)", "0xc2132D05D31c914a87C6611C10748AEb04B58e8F", 6),
        ],
    ),
    (
        NetworkId::SEPOLIA,
        &[coin("USDC", "USD Coin (Sepolia)", "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238", 6)],
    ),
    (
        NetworkId::BASE_SEPOLIA,
        &[coin("USDC", "USD Coin (Base Sepolia)", "0x036CbD53842c5426634e7929541eC2318f3dCF7e", 6)],
    ),
    (
        NetworkId::ARBITRUM_SEPOLIA,
        &[coin("USDC", "USD Coin (Arbitrum Sepolia)", "0x75faf114eafb1BDbe2F0316DF893fd58CE46AA4d", 6)],
    ),
    (
        NetworkId::OPTIMISM_SEPOLIA,
        &[coin("USDC", "USD Coin (Optimism Sepolia)", "0x5fd84259d66Cd46123540766Be93DFE6D43130D7", 6)],
    ),
    (
        NetworkId::FOUNDRY,
        &[coin("USDC", "USDC Mock (Local)", LOCAL_MOCK_PLACEHOLDER, 6)],
    ),
    (
        NetworkId::LOCALHOST,
        &[coin("USDC", "USDC Mock (Localhost)", LOCAL_MOCK_PLACEHOLDER, 6)],
    ),
];

#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    networks: HashMap<NetworkId, Vec<StablecoinDescriptor>>,
}

impl ChainRegistry {
    /// An empty registry: every network is unsupported.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stablecoin table shipped with the engine.
    pub fn builtin() -> Self {
        let networks = BUILTIN
            .iter()
            .map(|(network, coins)| {
                let descriptors = coins
                    .iter()
                    .map(|c| StablecoinDescriptor::new(c.symbol, c.name, c.address, c.decimals))
                    .collect();
                (*network, descriptors)
            })
            .collect();
        Self { networks }
    }

    /// Builder-style registration; replaces any previous entry for `network`.
    pub fn with_network(mut self, network: NetworkId, descriptors: Vec<StablecoinDescriptor>) -> Self {
        self.networks.insert(network, descriptors);
        self
    }

    /// Descriptors for `network` in configuration order. Empty means the
    /// network is unsupported.
    pub fn descriptors_for(&self, network: NetworkId) -> &[StablecoinDescriptor] {
        self.networks.get(&network).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_supported(&self, network: NetworkId) -> bool {
        !self.descriptors_for(network).is_empty()
    }

    /// Every network with at least one descriptor, ascending.
    pub fn supported_networks(&self) -> Vec<NetworkId> {
        let mut ids: Vec<NetworkId> = self
            .networks
            .iter()
            .filter(|(_, d)| !d.is_empty())
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Replace the address of the local mock descriptor(s) with `deployed`.
    /// All other descriptors are returned untouched, in order.
    pub fn apply_local_override(
        descriptors: &[StablecoinDescriptor],
        deployed: Address,
    ) -> Vec<StablecoinDescriptor> {
        descriptors
            .iter()
            .map(|d| {
                if d.symbol == LOCAL_MOCK_SYMBOL && d.name.contains(MOCK_NAME_MARKER) {
                    debug!("Local override: {} {} -> {}", d.symbol, d.address, deployed);
                    StablecoinDescriptor {
                        address: deployed,
                        ..d.clone()
                    }
                } else {
                    d.clone()
                }
            })
            .collect()
    }

    /// Resolve what the user sees: the connected wallet's network, or the
    /// configured fallback when no wallet is connected. The mock override is
    /// applied on local networks only.
    pub fn resolve(
        &self,
        connected: Option<NetworkId>,
        fallback: NetworkId,
        deployed_mock: Option<Address>,
    ) -> NetworkView {
        let network = connected.unwrap_or(fallback);
        let configured = self.descriptors_for(network);
        let stablecoins = match deployed_mock {
            Some(mock) if network.is_local() => Self::apply_local_override(configured, mock),
            _ => configured.to_vec(),
        };
        NetworkView {
            network,
            stablecoins,
        }
    }
}

/// The stablecoins visible on the currently resolved network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkView {
    pub network: NetworkId,
    pub stablecoins: Vec<StablecoinDescriptor>,
}

impl NetworkView {
    pub fn is_supported(&self) -> bool {
        !self.stablecoins.is_empty()
    }

    /// Descriptor for a token address on this network, if recognised.
    pub fn find(&self, token: Address) -> Option<&StablecoinDescriptor> {
        self.stablecoins.iter().find(|d| d.address == token)
    }
}
