//! Augmented prompt assembly.
//!
//! [`assemble`] is a pure function: the same profile section, excerpts, and
//! query always produce byte-identical output. The prompt has three
//! delimited sections in a fixed order:
//!
//! 1. `USER CORE PROFILE (JSON)`: pretty-printed profile, or placeholder text.
//! 2. `RELEVANT JOURNAL EXCERPTS`: retrieved chunks, verbatim, in rank order,
//!    separated by a blank line. Present (possibly empty) even with no hits.
//! 3. The user's query, quoted literally.
//!
//! Nothing inside the sections is escaped or filtered.

use crate::profile::ProfileSection;

const PREAMBLE: &str = "You are a thoughtful, compassionate life coach who helps the user \
reflect on their thoughts, patterns, and goals.";

const PROFILE_INTRO: &str = "Here is a JSON representation of the user's core profile, derived \
from their journal entries. It describes their values, patterns, goals, and challenges, and is \
always relevant:";

const EXCERPTS_INTRO: &str = "Here are some of the user's past journal entries that may be \
relevant to the current conversation:";

const CLOSING: &str = "Based on the USER CORE PROFILE (JSON), the RELEVANT JOURNAL EXCERPTS, and \
your understanding of the user, respond with insight, follow-up questions, or gentle \
encouragement. Consider the USER CORE PROFILE (JSON) in every response.";

pub const PROFILE_BEGIN: &str = "--- USER CORE PROFILE (JSON) ---";
pub const PROFILE_END: &str = "--- END USER CORE PROFILE (JSON) ---";
pub const EXCERPTS_BEGIN: &str = "--- RELEVANT JOURNAL EXCERPTS ---";
pub const EXCERPTS_END: &str = "--- END RELEVANT JOURNAL EXCERPTS ---";

/// Build the prompt sent to the language model for one turn.
///
/// # Example
///
/// ```rust
/// use journal_memory::assemble::assemble;
/// use journal_memory::profile::ProfileSection;
///
/// let profile = ProfileSection::Placeholder("No profile yet.".to_string());
/// let excerpts = vec!["Slept badly again.".to_string()];
/// let prompt = assemble(&profile, &excerpts, "Why am I tired?");
///
/// assert!(prompt.contains("No profile yet."));
/// assert!(prompt.contains("Slept badly again."));
/// assert!(prompt.contains("\"Why am I tired?\""));
/// ```
pub fn assemble(profile: &ProfileSection, excerpts: &[String], query: &str) -> String {
    let mut prompt = String::new();

    prompt.push_str(PREAMBLE);
    prompt.push_str("\n\n");

    prompt.push_str(PROFILE_INTRO);
    prompt.push('\n');
    prompt.push_str(PROFILE_BEGIN);
    prompt.push('\n');
    prompt.push_str(&profile.render());
    prompt.push('\n');
    prompt.push_str(PROFILE_END);
    prompt.push_str("\n\n");

    prompt.push_str(EXCERPTS_INTRO);
    prompt.push('\n');
    prompt.push_str(EXCERPTS_BEGIN);
    prompt.push('\n');
    prompt.push_str(&excerpts.join("\n\n"));
    prompt.push('\n');
    prompt.push_str(EXCERPTS_END);
    prompt.push_str("\n\n");

    prompt.push_str("Now, the user asks:\n\"");
    prompt.push_str(query);
    prompt.push_str("\"\n\n");

    prompt.push_str(CLOSING);
    prompt.push('\n');

    prompt
}
