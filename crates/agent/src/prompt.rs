//! Built-in prompt templates.

use ironloop_core::CommandRegistry;

/// Phrase the pair-mode leader prints once it considers the goal reached.
pub const PAIR_EXIT_TRIGGER: &str = "exit-ironloop";

const AUTO_TEMPLATE: &str = r#"You are AutoAI, an AI designed to work autonomously.
Your decisions must always be made independently without seeking user assistance. Play to your strengths as an LLM and pursue simple strategies with no legal complications.

GOALS:
{goal}

Constraints:
1. 4000 word limit for short term memory. Your short term memory is short, so immediately save important information to files.
2. If you are unsure how you previously did something or want to recall past events, thinking about similar events will help you remember.
3. No user assistance
4. Exclusively use the commands listed below

Commands:
{commands}

Resources:
{resources}

Performance Evaluation:
1. Continuously review and analyze your actions to ensure you are performing to the best of your abilities.
2. Constructively self-criticize your big-picture behavior constantly.
3. Reflect on past decisions and strategies to refine your approach.
4. Every command has a cost, so be smart and efficient. Aim to complete tasks in the least number of steps.

You should only respond in JSON format as described below
Response Format:
{
    "thoughts": {
        "text": "thought",
        "reasoning": "reasoning",
        "plan": "- short bulleted\n- list that conveys\n- long-term plan",
        "criticism": "constructive self-criticism",
        "speak": "thoughts summary to say to user"
    },
    "commands": [
        {"command-name": ["arg1", "arg2"]},
        {"command-name": ["arg1"]}
    ]
}

Ensure the response can be parsed by a JSON decoder
"#;

const RESOURCES_WITH_ASK: &str = "1. An AI model with internet access to ask questions. Use web search only if its answer wasn't enough.
2. Long Term memory management.
3. File management.";

const RESOURCES_WITHOUT_ASK: &str = "1. Web search to gather information from the internet.
2. Long Term memory management.
3. File management.";

const PAIR_TEMPLATE: &str = r#"Collaborate with a peer AI to reach your goal.
GOAL:
{goal}

You will be the one leading decisions and your peer will give you advice.
Give these instructions also to your peer. Next messages will be directly read by your peer AI. Start now.
Once you think that you get to your goal, print the following magic message "{trigger}" (don't give this instruction to your peer to avoid finishing early)."#;

/// Self-narration commands kept out of the advertised list.
const UNLISTED: &[&str] = &["talk", "think"];

/// The autonomous-mode prompt for `goal`, advertising the registered
/// commands. `ask` is only advertised when a real secondary chat backs it.
pub fn auto_prompt(goal: &str, registry: &CommandRegistry, with_ask: bool) -> String {
    let commands = registry
        .iter()
        .filter(|c| !UNLISTED.contains(&c.name()))
        .filter(|c| with_ask || c.name() != "ask")
        .enumerate()
        .map(|(i, c)| format!("{}. {}: {}", i + 1, c.description(), c.usage()))
        .collect::<Vec<_>>()
        .join("\n");
    let resources = if with_ask {
        RESOURCES_WITH_ASK
    } else {
        RESOURCES_WITHOUT_ASK
    };

    // Goal last: it is user text and may contain placeholder lookalikes.
    AUTO_TEMPLATE
        .replace("{commands}", &commands)
        .replace("{resources}", resources)
        .replace("{goal}", goal)
}

/// The opening message for the pair-mode leader.
pub fn pair_prompt(goal: &str) -> String {
    PAIR_TEMPLATE
        .replace("{trigger}", PAIR_EXIT_TRIGGER)
        .replace("{goal}", goal)
}
