// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

use ethers::prelude::abigen;

// Bridge contract surface consumed by the validator. `TokensLocked` is the
// only event we ingest; `releaseTokens` is the only mutation we submit.
abigen!(
    BaseBridge,
    r#"[
        event TokensLocked(address indexed token, uint256 amount, bytes32 recipient)
        function lockTokens(address token, uint256 amount, bytes32 recipient)
        function releaseTokens(address token, address recipient, uint256 amount, string txId, bytes[] signatures)
        function validators(address account) external view returns (bool)
        function requiredSignatures() external view returns (uint256)
    ]"#
);

abigen!(
    Erc20,
    r#"[
        function decimals() external view returns (uint8)
        function balanceOf(address owner) external view returns (uint256)
        function approve(address spender, uint256 amount) external returns (bool)
        function allowance(address owner, address spender) external view returns (uint256)
    ]"#
);
