use alloy::sol;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    contract TipBot {
        event Deposit(string userId, uint256 amount);
        event Tip(string fromId, string toId, uint256 amount, uint256 fee);
        event Withdraw(string userId, address to, uint256 amount);

        function deposit(string userId) external payable;
        function getBalance(string userId) external view returns (uint256);
        function getStats(string userId)
            external
            view
            returns (uint256 balance, uint256 totalSent, uint256 totalReceived);
        function tip(string fromId, string toId, uint256 amount) external;
        function withdraw(string userId, address to, uint256 amount) external;
    }
}
