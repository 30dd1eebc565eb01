//! # Prompts
//!
//! System instructions handed to the text capabilities.

pub const ASSISTANT_SYSTEM: &str =
    "You are best personal assistant. Respond only with short answer no more than five sentences.";

pub const SUMMARIZE_SYSTEM: &str = "You should summarize next sentence:";

pub const TRANSLATE_SYSTEM: &str = "Translate to english:";

/// Default negative prompt for the image backend. Trimmed variant of the
/// checkpoint author's recommended list.
pub const IMAGE_NEGATIVE_PROMPT: &str = "(deformed, destorted, disfigured: 1.3),\
stacked torsos,totem pole,poorly drawn,bad anatomy,extra limb,missing limb,\
floating limbs,(mutated hands and fingers: 1.4),disconnected limbs,mutation,\
mutated,ugly,disgusting,blur,blurry,amputation,out of focus,childish,surreal,text";
