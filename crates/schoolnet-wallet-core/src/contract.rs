//! Binding of the deployed connectivity registry.

use ethers::contract::abigen;

abigen!(
    ConnectivityRegistry,
    r#"[
        function submitData(uint256 schoolId, uint256 timestamp, uint32 downloadSpeed, uint32 uploadSpeed, uint32 latency, bytes32 dataHash)
        function getLatestData(uint256 schoolId) view returns (uint256 timestamp, uint32 downloadSpeed, uint32 uploadSpeed, uint32 latency, bytes32 dataHash)
        event DataSubmitted(uint256 indexed schoolId, uint256 timestamp, uint32 downloadSpeed, uint32 uploadSpeed, uint32 latency, bytes32 dataHash)
    ]"#
);
