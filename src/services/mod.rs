pub mod chain;
pub mod conversion;
pub mod sampler;
pub mod storage;
pub mod synchronizer;

pub use chain::{ChainClient, EthereumClient};
pub use conversion::{convert_fee, FeeConversion, FeeConversionService};
pub use sampler::{BlockFeeAggregate, FeeSampler};
pub use storage::{GasFeeStore, PriceStore, StorageService};
pub use synchronizer::{OracleSynchronizer, ShutdownCause, SynchronizerGroup};
