//! Dice roller: `!dice NdM` rolls N dice with M sides and replies with the total.

use super::{builtin_regex, Handler};
use crate::message::Message;
use async_trait::async_trait;
use rand::Rng;
use regex::Regex;

const USAGE: &str = "`!dice nDm` where n is the number of dice and m is the number of sides \
                     (e.g. `!dice 2d6` means roll 2 6-sided dice)";

pub struct DicePlugin {
    pattern: Regex,
    roll: Regex,
}

impl Default for DicePlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl DicePlugin {
    pub fn new() -> Self {
        Self {
            pattern: builtin_regex(r"(?i)^!dice"),
            roll: builtin_regex(r"(?i)^!dice (\d{1,5})d(\d{1,5})$"),
        }
    }

    fn reply_for(&self, text: &str) -> String {
        let Some(caps) = self.roll.captures(text) else {
            return USAGE.to_string();
        };
        // At most five digits each, so these always parse.
        let dice: u32 = caps[1].parse().unwrap_or(0);
        let sides: u32 = caps[2].parse().unwrap_or(0);
        log::debug!("dice: {} sides: {}", dice, sides);
        if sides == 0 {
            return "I can't roll a 0-sided die!".to_string();
        }
        if dice == 0 {
            return "I can't roll 0 dice!".to_string();
        }
        format!("you rolled `{}`", roll(dice, sides))
    }
}

#[async_trait]
impl Handler for DicePlugin {
    fn name(&self) -> &str {
        "Dice"
    }

    fn usage(&self) -> &str {
        USAGE
    }

    fn commands(&self) -> &[&str] {
        &["!dice"]
    }

    fn pattern(&self) -> &Regex {
        &self.pattern
    }

    async fn handle(&self, msg: &Message) -> Message {
        Message::reply(self.reply_for(&msg.text))
    }
}

/// Sum of `dice` uniform rolls in `1..=sides`.
fn roll(dice: u32, sides: u32) -> u64 {
    let mut rng = rand::thread_rng();
    (0..dice).map(|_| u64::from(rng.gen_range(1..=sides))).sum()
}
