use crate::rng::Rng;
use crate::types::Theme;

const CRYPTO_WORDS: [&str; 20] = [
    "Ethereum",
    "Solidity",
    "DeFi",
    "Rollup",
    "MEV",
    "Bridge",
    "L2",
    "ZK",
    "OP",
    "Base",
    "Airdrop",
    "RPC",
    "Gas",
    "Wallet",
    "EVM",
    "ERC20",
    "ERC721",
    "Liquidity",
    "Stake",
    "Yield",
];

const AI_WORDS: [&str; 20] = [
    "Transformer",
    "Token",
    "Prompt",
    "Embedding",
    "Diffusion",
    "LoRA",
    "RAG",
    "Agent",
    "Inference",
    "Latent",
    "RLHF",
    "Dataset",
    "GPU",
    "CUDA",
    "Batch",
    "LLM",
    "Context",
    "Vector",
    "Cache",
    "MoE",
];

const MEME_WORDS: [&str; 20] = [
    "WAGMI",
    "HODL",
    "NGMI",
    "Rekt",
    "FOMO",
    "FUD",
    "Devs",
    "Ape",
    "Moon",
    "Degen",
    "Pump",
    "Dump",
    "Giga",
    "GM",
    "Ser",
    "CT",
    "Copium",
    "Based",
    "Pepe",
    "Doge",
];

pub fn word_list(theme: Theme) -> &'static [&'static str] {
    match theme {
        Theme::Crypto => &CRYPTO_WORDS,
        Theme::Ai => &AI_WORDS,
        Theme::Memes => &MEME_WORDS,
    }
}

/// Uniform draw from the theme's list. Repeats across a run are allowed.
pub fn pick_word(rng: &mut Rng, theme: Theme) -> &'static str {
    let list = word_list(theme);
    list[rng.pick_index(list.len())]
}
