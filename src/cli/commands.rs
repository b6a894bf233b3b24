use crate::core::parse_amount;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

/// Coin amount given on the command line, held in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountArg(pub u64);

impl FromStr for AmountArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parse_amount(s) {
            Ok(0) => Err("Amount must be positive".to_string()),
            Ok(units) => Ok(AmountArg(units)),
            Err(e) => Err(e.to_string()),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "ledger-chain", about = "Single-node proof-of-work ledger")]
pub struct Opt {
    #[arg(long, global = true, help = "Database directory (overrides LEDGER_DB_PATH)")]
    pub db_path: Option<PathBuf>,
    #[arg(long, global = true, help = "Proof-of-work difficulty in leading zero bits")]
    pub difficulty: Option<u32>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(
        name = "creategenesis",
        about = "Create the genesis block paying the reward to ADDRESS"
    )]
    CreateGenesis {
        #[arg(long, help = "Address receiving the genesis reward")]
        address: String,
    },
    #[command(name = "send", about = "Mine a block with one or more transfers")]
    Send {
        #[arg(long = "from", required = true, help = "Sender address (repeatable)")]
        from: Vec<String>,
        #[arg(long = "to", required = true, help = "Recipient address (repeatable)")]
        to: Vec<String>,
        #[arg(long = "value", required = true, help = "Amount in coins (repeatable)")]
        value: Vec<AmountArg>,
    },
    #[command(name = "getbalance", about = "Get the balance of an address")]
    GetBalance {
        #[arg(long, help = "The wallet address")]
        address: String,
    },
    #[command(name = "getlastblock", about = "Print the tip of the chain")]
    GetLastBlock,
    #[command(name = "getblockcount", about = "Print the number of blocks")]
    GetBlockCount,
    #[command(name = "getallblocks", about = "Print every block from tip to genesis")]
    GetAllBlocks,
    #[command(name = "getnewaddress", about = "Create a new wallet address")]
    GetNewAddress,
    #[command(name = "listaddresses", about = "Print local wallet addresses")]
    ListAddresses,
    #[command(name = "dumpprivkey", about = "Print the PKCS#8 private key of an address as hex")]
    DumpPrivKey {
        #[arg(long, help = "The wallet address")]
        address: String,
    },
    #[command(name = "setcoinbase", about = "Set the address receiving block rewards")]
    SetCoinbase {
        #[arg(long, help = "The reward address")]
        address: String,
    },
    #[command(name = "getcoinbase", about = "Print the address receiving block rewards")]
    GetCoinbase,
    #[command(name = "verifychain", about = "Re-check every block from tip to genesis")]
    VerifyChain,
}
