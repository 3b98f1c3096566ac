//! chainsync-evm — EVM chain reader and the sync engine.

pub mod builder;
pub mod engine;
pub mod reader;
pub mod rpc;

pub use builder::SyncBuilder;
pub use engine::{StepOutcome, SyncEngine};
pub use reader::{AbiSource, ChainReader, EvmChainReader, NoAbi};
pub use rpc::{HttpRpcClient, RpcTransport};
