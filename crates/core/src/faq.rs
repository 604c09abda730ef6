//! Keyword-driven FAQ responder used by the support chat.
//!
//! Rules are checked top to bottom against the lowercased input and the first
//! rule with a matching keyword wins. Anything that matches nothing gets the
//! fallback reply, so every input maps to a non-empty answer.

use serde::{Deserialize, Serialize};

pub const GREETING: &str = "Hello! How can I help you today?";

pub const FALLBACK_REPLY: &str =
    "I'm here to help! Could you please provide more details about your question?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaqTopic {
    Pricing,
    Refund,
    Duration,
    Certificate,
    Support,
    Prerequisites,
    Fallback,
}

impl FaqTopic {
    pub fn as_code(self) -> &'static str {
        match self {
            Self::Pricing => "pricing",
            Self::Refund => "refund",
            Self::Duration => "duration",
            Self::Certificate => "certificate",
            Self::Support => "support",
            Self::Prerequisites => "prerequisites",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IntentRule {
    pub topic: FaqTopic,
    pub keywords: &'static [&'static str],
    pub response: &'static str,
}

/// Priority order matters: an input mentioning both price and refunds is a
/// pricing question.
pub const FAQ_RULES: &[IntentRule] = &[
    IntentRule {
        topic: FaqTopic::Pricing,
        keywords: &["price", "cost"],
        response: "Our courses range from $49 to $199. You can find detailed pricing on each course page.",
    },
    IntentRule {
        topic: FaqTopic::Refund,
        keywords: &["refund", "money back"],
        response: "We offer a 30-day money-back guarantee if you're not satisfied with the course.",
    },
    IntentRule {
        topic: FaqTopic::Duration,
        keywords: &["duration", "length"],
        response: "Course durations vary from 4 to 12 weeks, depending on the complexity and content.",
    },
    IntentRule {
        topic: FaqTopic::Certificate,
        keywords: &["certificate"],
        response: "Yes, you'll receive a certificate of completion after finishing the course.",
    },
    IntentRule {
        topic: FaqTopic::Support,
        keywords: &["support", "help"],
        response: "We provide 24/7 support through our help center and email support@motiondesignclub.com",
    },
    IntentRule {
        topic: FaqTopic::Prerequisites,
        keywords: &["prerequisite", "requirement"],
        response: "Most courses require basic computer skills. Some advanced courses may require prior experience with design software.",
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaqMatch {
    pub topic: FaqTopic,
    pub reply: &'static str,
    pub keyword: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
pub struct FaqResponder {
    rules: &'static [IntentRule],
    fallback: &'static str,
}

impl Default for FaqResponder {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FaqResponder {
    pub fn builtin() -> Self {
        Self {
            rules: FAQ_RULES,
            fallback: FALLBACK_REPLY,
        }
    }

    pub fn respond(&self, input: &str) -> FaqMatch {
        let lower = input.to_lowercase();

        for rule in self.rules {
            if let Some(keyword) = first_contained(&lower, rule.keywords) {
                return FaqMatch {
                    topic: rule.topic,
                    reply: rule.response,
                    keyword: Some(keyword),
                };
            }
        }

        FaqMatch {
            topic: FaqTopic::Fallback,
            reply: self.fallback,
            keyword: None,
        }
    }
}

pub fn match_faq(input: &str) -> &'static str {
    FaqResponder::builtin().respond(input).reply
}

fn first_contained(input: &str, needles: &[&'static str]) -> Option<&'static str> {
    needles.iter().copied().find(|needle| input.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_for(topic: FaqTopic) -> &'static str {
        FAQ_RULES
            .iter()
            .find(|rule| rule.topic == topic)
            .map(|rule| rule.response)
            .unwrap()
    }

    #[test]
    fn pricing_question_gets_pricing_reply() {
        assert_eq!(
            match_faq("What's the price of a course?"),
            reply_for(FaqTopic::Pricing)
        );
        assert_eq!(match_faq("how much does it cost"), reply_for(FaqTopic::Pricing));
    }

    #[test]
    fn refund_question_gets_refund_reply() {
        assert_eq!(match_faq("Do you offer a refund?"), reply_for(FaqTopic::Refund));
        assert_eq!(match_faq("can I get my money back"), reply_for(FaqTopic::Refund));
    }

    #[test]
    fn unknown_and_empty_input_fall_back() {
        assert_eq!(match_faq("hello"), FALLBACK_REPLY);
        assert_eq!(match_faq(""), FALLBACK_REPLY);
        assert_eq!(match_faq("   "), FALLBACK_REPLY);
    }

    #[test]
    fn matching_ignores_case() {
        assert_eq!(match_faq("PRICE"), match_faq("price"));
        assert_eq!(
            match_faq("CERTIFICATE please"),
            reply_for(FaqTopic::Certificate)
        );
    }

    #[test]
    fn earlier_rule_wins_on_overlap() {
        let matched = FaqResponder::builtin().respond("refund or price?");
        assert_eq!(matched.topic, FaqTopic::Pricing);
        assert_eq!(matched.keyword, Some("price"));
    }

    #[test]
    fn remaining_topics_are_reachable() {
        let responder = FaqResponder::builtin();
        assert_eq!(responder.respond("course length").topic, FaqTopic::Duration);
        assert_eq!(responder.respond("I need help").topic, FaqTopic::Support);
        assert_eq!(
            responder.respond("Any requirements?").topic,
            FaqTopic::Prerequisites
        );
    }

    #[test]
    fn responder_is_stateless() {
        let responder = FaqResponder::builtin();
        let first = responder.respond("support hours?");
        let second = responder.respond("support hours?");
        assert_eq!(first, second);
    }

    #[test]
    fn every_reply_is_non_empty() {
        assert!(!FALLBACK_REPLY.is_empty());
        assert!(FAQ_RULES.iter().all(|rule| !rule.response.is_empty()));
    }
}
