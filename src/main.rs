use clap::Parser;
use data_encoding::HEXLOWER;
use ledger_chain::{
    address_from_pub_key_hash, format_amount, hash_pub_key, Block, Blockchain, Command, Opt,
    GLOBAL_CONFIG,
};
use log::error;
use std::process;

fn main() {
    let opt = Opt::parse();

    if let Some(path) = &opt.db_path {
        GLOBAL_CONFIG.set_db_path(path);
    }
    if let Some(difficulty) = opt.difficulty {
        GLOBAL_CONFIG.set_difficulty(difficulty);
    }

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(GLOBAL_CONFIG.get_log_level()),
    )
    .init();

    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let settings = GLOBAL_CONFIG.settings()?;
    let mut chain = Blockchain::open(&settings)?;

    match command {
        Command::CreateGenesis { address } => {
            let genesis = chain.create_coinbase(&address)?;
            println!("Genesis block {}", genesis.get_hash_hex());
        }
        Command::Send { from, to, value } => {
            let values: Vec<u64> = value.iter().map(|amount| amount.0).collect();
            let block = chain.send_transaction(&from, &to, &values)?;
            println!(
                "Mined block {} at height {}",
                block.get_hash_hex(),
                block.get_height()
            );
        }
        Command::GetBalance { address } => {
            let balance = chain.get_balance(&address)?;
            println!("Balance of {address}: {}", format_amount(balance));
        }
        Command::GetLastBlock => match chain.get_last_block() {
            Some(block) => print_block(block),
            None => println!("Chain is empty"),
        },
        Command::GetBlockCount => println!("{}", chain.get_block_count()),
        Command::GetAllBlocks => {
            for block in chain.iterator() {
                print_block(&block?);
            }
        }
        Command::GetNewAddress => {
            let address = chain.get_new_address()?;
            println!("{address}");
        }
        Command::ListAddresses => {
            for address in chain.list_addresses() {
                println!("{address}");
            }
        }
        Command::DumpPrivKey { address } => {
            let pkcs8 = chain.dump_private_key(&address)?;
            println!("{}", HEXLOWER.encode(&pkcs8));
        }
        Command::SetCoinbase { address } => {
            chain.set_coinbase(&address)?;
            println!("Coinbase set to {address}");
        }
        Command::GetCoinbase => match chain.get_coinbase() {
            Some(address) => println!("{address}"),
            None => println!("No coinbase address set"),
        },
        Command::VerifyChain => {
            let checked = chain.verify_chain()?;
            println!("Chain is valid ({checked} blocks)");
        }
    }
    Ok(())
}

fn print_block(block: &Block) {
    println!("Height:     {}", block.get_height());
    println!("Hash:       {}", block.get_hash_hex());
    println!("Prev hash:  {}", HEXLOWER.encode(block.get_pre_block_hash()));
    println!("Merkle:     {}", HEXLOWER.encode(block.get_merkle_root()));
    println!("Timestamp:  {}", block.get_timestamp());
    println!("Nonce:      {}", block.get_nonce());

    for tx in block.get_transactions() {
        println!("- Transaction {}", HEXLOWER.encode(tx.get_hash()));
        for input in tx.get_vin() {
            let address = address_from_pub_key_hash(&hash_pub_key(input.get_pub_key()));
            println!(
                "-- Input txid = {}, vout = {}, from = {address}",
                HEXLOWER.encode(input.get_txid()),
                input.get_vout()
            );
        }
        for output in tx.get_vout() {
            println!(
                "-- Output value = {}, to = {}",
                format_amount(output.get_value()),
                address_from_pub_key_hash(output.get_pub_key_hash())
            );
        }
    }
    println!();
}
