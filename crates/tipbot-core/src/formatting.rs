//! User-facing texts and their Telegram HTML rendering.
//!
//! Texts are written once in a light markdown (`**bold**`, `` `code` ``,
//! `[label](url)`). Discord renders that natively; Telegram gets it converted
//! to its HTML subset by [`markdown_to_telegram_html`].

use std::sync::OnceLock;

use alloy_primitives::U256;
use regex::Regex;

use crate::{
    amount::{format_eth, split_fee, FEE_BASIS_POINTS},
    domain::{Address, ContractUserId, Platform, TxOutcome, UserStats},
};

pub const PROCESSING_TIP: &str = "⏳ Processing tip...";
pub const PROCESSING_WITHDRAWAL: &str = "⏳ Processing withdrawal...";

fn fee_percent() -> String {
    format!("{}%", FEE_BASIS_POINTS as f64 / 100.0)
}

fn tip_usage(platform: Platform) -> &'static str {
    match platform {
        Platform::Telegram => "/tip @username [amount]",
        Platform::Discord => "/tip user:@username [amount]",
    }
}

pub fn help_text(platform: Platform) -> String {
    format!(
        "🤖 **Welcome to Base Tip Bot!**\n\n\
         Send ETH tips to friends using the Base blockchain.\n\n\
         **Commands:**\n\
         /deposit - Get deposit instructions\n\
         /balance - Check your balance\n\
         `{usage}` - Send a tip (leave out the amount to pick a preset)\n\
         `/withdraw <address> <amount>` - Withdraw to your wallet\n\
         /stats - View your statistics\n\
         /help - Show this message\n\n\
         **Examples:**\n\
         `/tip @alice 0.001` - Tip 0.001 ETH to alice\n\
         `/withdraw 0x123... 0.01` - Withdraw 0.01 ETH\n\n\
         Platform fee: {fee} per tip",
        usage = tip_usage(platform),
        fee = fee_percent(),
    )
}

pub fn balance_text(balance: U256) -> String {
    format!(
        "💵 **Your Balance**\n\n{} ETH\n\nUse `/deposit` to add funds\nUse `/tip` to send tips",
        format_eth(balance)
    )
}

pub fn stats_text(stats: &UserStats) -> String {
    format!(
        "📊 **Your Statistics**\n\n\
         Balance: {} ETH\n\
         Total Tips Sent: {} ETH\n\
         Total Tips Received: {} ETH\n\n\
         Keep tipping! 💰",
        format_eth(stats.balance),
        format_eth(stats.total_sent),
        format_eth(stats.total_received),
    )
}

pub fn deposit_text(contract: Address, user_id: &ContractUserId, dashboard: Option<&str>) -> String {
    let mut out = format!(
        "💰 **Deposit ETH to your tip wallet**\n\n\
         **Contract:** `{}`\n\
         **Your User ID:** `{user_id}`\n\n\
         To deposit, send ETH to the contract and call the `deposit` function with your user ID.",
        contract.to_checksum(None)
    );
    if let Some(url) = dashboard {
        out.push_str(&format!("\n\nOr use the [web dashboard]({url}) for an easy deposit."));
    }
    out
}

pub fn proposal_text(platform: Platform, recipient_name: &str, balance: Option<U256>) -> String {
    let balance = match balance {
        Some(b) => format!("{} ETH", format_eth(b)),
        None => "unavailable".to_string(),
    };
    format!(
        "💰 **Send tip to {recipient_name}**\n\n\
         Your balance: {balance}\n\n\
         Select an amount or use `{}`:",
        custom_tip_command(platform, recipient_name)
    )
}

fn custom_tip_command(platform: Platform, recipient_name: &str) -> String {
    match platform {
        Platform::Telegram => format!("/tip @{recipient_name} <amount>"),
        Platform::Discord => format!("/tip user:@{recipient_name} amount:<amount>"),
    }
}

pub fn custom_amount_text(platform: Platform, recipient_name: &str) -> String {
    format!(
        "To send a custom amount, use:\n`{}`",
        custom_tip_command(platform, recipient_name)
    )
}

pub fn tip_result_text(
    sender_name: &str,
    recipient_name: &str,
    amount: U256,
    outcome: &TxOutcome,
    tx_link: &str,
) -> String {
    let (fee, net) = split_fee(amount);
    let header = match outcome {
        TxOutcome::Confirmed { .. } => "✅ **Tip sent!**",
        TxOutcome::Pending { .. } => "⏳ **Tip submitted, still pending.** Check the link later.",
    };
    format!(
        "{header}\n\n\
         From: {sender_name}\n\
         To: {recipient_name}\n\
         Amount: {} ETH\n\
         Fee: {} ETH ({})\n\
         Received: {} ETH\n\n\
         Transaction: {tx_link}",
        format_eth(amount),
        format_eth(fee),
        fee_percent(),
        format_eth(net),
    )
}

pub fn withdraw_result_text(
    amount: U256,
    destination: Address,
    outcome: &TxOutcome,
    tx_link: &str,
) -> String {
    let header = match outcome {
        TxOutcome::Confirmed { .. } => "✅ **Withdrawal successful!**",
        TxOutcome::Pending { .. } => {
            "⏳ **Withdrawal submitted, still pending.** Check the link later."
        }
    };
    format!(
        "{header}\n\n\
         Amount: {} ETH\n\
         To: `{}`\n\n\
         Transaction: {tx_link}",
        format_eth(amount),
        destination.to_checksum(None),
    )
}

pub fn recipient_notice_text(
    sender_name: &str,
    net_amount: U256,
    recipient_id: &ContractUserId,
    tx_link: &str,
) -> String {
    format!(
        "🎉 **You received a tip!**\n\n\
         From: {sender_name}\n\
         Amount: {} ETH\n\
         Your User ID: `{recipient_id}`\n\n\
         💰 Your new balance includes this tip!\n\n\
         To check balance: `/balance`\n\
         To withdraw: `/withdraw <address> <amount>`\n\n\
         Transaction: {tx_link}",
        format_eth(net_amount),
    )
}

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").expect("valid regex"))
}

/// Convert the markdown subset used by the texts above to Telegram HTML.
pub fn markdown_to_telegram_html(input: &str) -> String {
    let (text, inline_codes) = extract_inline_codes(input);

    let mut html = escape_html(&text);
    html = replace_delimited(&html, "**", "<b>", "</b>");
    html = link_re()
        .replace_all(&html, r#"<a href="$2">$1</a>"#)
        .to_string();

    for (i, code) in inline_codes.iter().enumerate() {
        html = html.replace(
            &format!("\0INLINECODE{i}\0"),
            &format!("<code>{}</code>", escape_html(code)),
        );
    }
    html
}

fn extract_inline_codes(input: &str) -> (String, Vec<String>) {
    let mut codes = Vec::new();
    let mut out = String::new();

    let mut i = 0usize;
    while let Some(rel) = input[i..].find('`') {
        let start = i + rel;
        out.push_str(&input[i..start]);

        let content_start = start + 1;
        let Some(end_rel) = input[content_start..].find('`') else {
            // Unclosed: keep the rest verbatim.
            out.push_str(&input[start..]);
            return (out, codes);
        };
        let end = content_start + end_rel;
        out.push_str(&format!("\0INLINECODE{}\0", codes.len()));
        codes.push(input[content_start..end].to_string());
        i = end + 1;
    }

    out.push_str(&input[i..]);
    (out, codes)
}

fn replace_delimited(text: &str, delim: &str, open: &str, close: &str) -> String {
    let mut out = String::new();
    let mut i = 0usize;
    while let Some(rel) = text[i..].find(delim) {
        let start = i + rel;
        out.push_str(&text[i..start]);
        let content_start = start + delim.len();
        let Some(end_rel) = text[content_start..].find(delim) else {
            out.push_str(&text[start..]);
            return out;
        };
        let end = content_start + end_rel;
        out.push_str(open);
        out.push_str(&text[content_start..end]);
        out.push_str(close);
        i = end + delim.len();
    }
    out.push_str(&text[i..]);
    out
}
