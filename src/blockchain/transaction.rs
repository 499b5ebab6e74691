use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    hash::Hash,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Signature, Signer},
    transaction::Transaction,
};

use crate::blockchain::rpc_client::ChainClient;
use crate::core::error::{Error, Result};

pub struct TransactionBuilder {
    instructions: Vec<Instruction>,
    payer: Pubkey,
}

impl TransactionBuilder {
    pub fn new(payer: Pubkey) -> Self {
        TransactionBuilder {
            instructions: Vec::new(),
            payer,
        }
    }

    /// Prepends nothing when `units` is zero.
    pub fn add_compute_budget(&mut self, units: u32, price: u64) -> &mut Self {
        if units == 0 {
            return self;
        }
        self.instructions
            .push(ComputeBudgetInstruction::set_compute_unit_limit(units));
        if price > 0 {
            self.instructions
                .push(ComputeBudgetInstruction::set_compute_unit_price(price));
        }
        self
    }

    pub fn add_instruction(&mut self, ix: Instruction) -> &mut Self {
        self.instructions.push(ix);
        self
    }

    pub fn add_instructions<I>(&mut self, ixs: I) -> &mut Self
    where
        I: IntoIterator<Item = Instruction>,
    {
        self.instructions.extend(ixs);
        self
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Unsigned transaction. Call [`sign_transaction`] exactly once afterwards.
    pub fn build(&self, blockhash: Hash) -> Transaction {
        let mut tx = Transaction::new_with_payer(&self.instructions, Some(&self.payer));
        tx.message.recent_blockhash = blockhash;
        tx
    }
}

/// Signs with every required signer. Fails on a missing or extra signer, or on a second signing.
pub fn sign_transaction(tx: &mut Transaction, signers: &[&dyn Signer]) -> Result<()> {
    if tx.signatures.iter().any(|sig| *sig != Signature::default()) {
        return Err(Error::TransactionRejected(
            "transaction already signed, refusing to sign twice".to_string(),
        ));
    }

    let blockhash = tx.message.recent_blockhash;
    tx.try_sign(signers, blockhash)
        .map_err(|e| Error::TransactionRejected(format!("signing failed: {}", e)))
}

/// Fetch a blockhash, build, sign and submit. Submission errors become `TransactionRejected`.
pub async fn send_and_confirm<C: ChainClient + ?Sized>(
    client: &C,
    builder: &TransactionBuilder,
    signers: &[&dyn Signer],
) -> Result<Signature> {
    let blockhash = client
        .get_latest_blockhash()
        .await
        .map_err(|e| Error::Rpc(e.to_string()))?;

    let mut tx = builder.build(blockhash);
    sign_transaction(&mut tx, signers)?;

    client
        .send_transaction(&tx)
        .await
        .map_err(|e| Error::TransactionRejected(e.to_string()))
}
