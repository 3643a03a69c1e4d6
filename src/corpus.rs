//! Built-in seed corpus served by the simulated vector store.
//!
//! A small, fixed set of chunks covering the knowledge base's three topics:
//! LLM-powered agents, prompt engineering, and adversarial attacks on LLMs.

/// A pre-chunked seed document.
#[derive(Debug, Clone, Copy)]
pub struct SeedChunk {
    pub id: &'static str,
    pub document_id: &'static str,
    pub text: &'static str,
    pub url: &'static str,
}

const AGENT_URL: &str = "https://lilianweng.github.io/posts/2023-06-23-agent/";
const PROMPT_URL: &str = "https://lilianweng.github.io/posts/2023-03-15-prompt-engineering/";
const ATTACK_URL: &str = "https://lilianweng.github.io/posts/2023-10-25-adv-attack-llm/";

pub const SEED_CORPUS: &[SeedChunk] = &[
    SeedChunk {
        id: "agent-overview",
        document_id: "llm-powered-agents",
        text: "An LLM-powered autonomous agent system uses a large language model as its \
               core controller, complemented by planning, memory and tool use components.",
        url: AGENT_URL,
    },
    SeedChunk {
        id: "agent-memory-types",
        document_id: "llm-powered-agents",
        text: "Types of memory in agents: sensory memory holds raw embeddings of inputs, \
               short-term memory is in-context learning bounded by the context window, and \
               long-term memory is an external vector store the agent can attend to at query time.",
        url: AGENT_URL,
    },
    SeedChunk {
        id: "agent-memory-retrieval",
        document_id: "llm-powered-agents",
        text: "Long-term memory retrieval relies on maximum inner product search; approximate \
               nearest neighbor algorithms such as HNSW, FAISS, ScaNN and LSH trade a little \
               accuracy for a large speedup.",
        url: AGENT_URL,
    },
    SeedChunk {
        id: "agent-planning",
        document_id: "llm-powered-agents",
        text: "Planning lets an agent break a complicated task into subgoals through task \
               decomposition, and improve through self-reflection techniques such as ReAct \
               and Reflexion that learn from past mistakes.",
        url: AGENT_URL,
    },
    SeedChunk {
        id: "agent-tool-use",
        document_id: "llm-powered-agents",
        text: "Tool use extends an agent with external APIs for calculators, code execution, \
               search and proprietary information sources, as explored by MRKL, Toolformer \
               and HuggingGPT.",
        url: AGENT_URL,
    },
    SeedChunk {
        id: "prompt-zero-few-shot",
        document_id: "prompt-engineering",
        text: "Zero-shot prompting feeds the task text directly to the model, while few-shot \
               prompting presents a set of high-quality demonstrations, each with input and \
               desired output, before the target task.",
        url: PROMPT_URL,
    },
    SeedChunk {
        id: "prompt-chain-of-thought",
        document_id: "prompt-engineering",
        text: "Chain-of-thought prompting generates a sequence of short reasoning steps before \
               the final answer; self-consistency sampling takes a majority vote over several \
               sampled reasoning paths.",
        url: PROMPT_URL,
    },
    SeedChunk {
        id: "prompt-instruction",
        document_id: "prompt-engineering",
        text: "Instruction prompting describes the task explicitly; instruction tuned models \
               such as InstructGPT are fine-tuned with reinforcement learning from human \
               feedback to follow instructions.",
        url: PROMPT_URL,
    },
    SeedChunk {
        id: "prompt-retrieval-augmented",
        document_id: "prompt-engineering",
        text: "Retrieval-augmented prompting fetches relevant documents from a knowledge base \
               and adds them to the prompt context so the model can answer questions beyond \
               its pretraining data.",
        url: PROMPT_URL,
    },
    SeedChunk {
        id: "attack-jailbreak",
        document_id: "adversarial-attacks-llm",
        text: "Jailbreak prompts are adversarial inputs crafted to trigger a language model \
               into outputting harmful content that safety alignment should have prevented.",
        url: ATTACK_URL,
    },
    SeedChunk {
        id: "attack-token-manipulation",
        document_id: "adversarial-attacks-llm",
        text: "Token manipulation attacks alter a small fraction of tokens in the input text, \
               such as synonym replacement, to make a model fail while keeping the semantic \
               meaning intact.",
        url: ATTACK_URL,
    },
    SeedChunk {
        id: "attack-gradient",
        document_id: "adversarial-attacks-llm",
        text: "Gradient based attacks such as universal adversarial triggers and GCG search \
               for suffix tokens that maximize the likelihood of an unsafe response, given \
               white-box access to model weights.",
        url: ATTACK_URL,
    },
];
