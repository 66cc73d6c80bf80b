use alloy_sol_types::sol;

sol! {
    #[sol(rpc)]
    interface IFHECounter {
        /// Current encrypted count; an `euint32` handle.
        function getCount() external view returns (bytes32);

        function increment(bytes32 inputEuint32, bytes calldata inputProof) external;

        function decrement(bytes32 inputEuint32, bytes calldata inputProof) external;
    }
}

pub use IFHECounter::{IFHECounterCalls, IFHECounterInstance};
