//! Trigger patterns: `time.every(5s)`, `mention(self)`, `event(storm.*)`

use nom::{
    bytes::complete::{tag, take_while1},
    character::complete::{alpha1, char, digit1, multispace0},
    combinator::{opt, recognize},
    IResult, Parser,
};

use crate::core::types::EntityId;

/// Who a mention trigger listens for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MentionTarget {
    /// Addressed to this entity or naming it in the text
    SelfEntity,
    /// Any utterance by someone else
    Others,
    /// Every utterance, including the entity's own
    Any,
    /// Utterances spoken by one specific entity
    Entity(EntityId),
}

/// How an event pattern's name is compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventMatch {
    Exact,
    /// `storm.*`
    Prefix,
    /// Bare `*`
    Any,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerPattern {
    Periodic { interval: f64 },
    Mention { target: MentionTarget },
    Event { match_kind: EventMatch, name: String },
}

impl TriggerPattern {
    /// Returns `None` for unsupported pattern text
    pub fn parse(source: &str) -> Option<TriggerPattern> {
        let source = source.trim();
        let parsed = if source.starts_with("time.every") {
            periodic(source)
        } else if source.starts_with("mention") {
            mention(source)
        } else if source.starts_with("event") {
            event(source)
        } else {
            return None;
        };
        match parsed {
            Ok((rest, pattern)) if rest.trim().is_empty() => Some(pattern),
            _ => None,
        }
    }

    pub fn matches_event(&self, event_name: &str) -> bool {
        match self {
            TriggerPattern::Event { match_kind, name } => match match_kind {
                EventMatch::Exact => name == event_name,
                EventMatch::Prefix => event_name.starts_with(name.as_str()),
                EventMatch::Any => true,
            },
            _ => false,
        }
    }
}

type PResult<'a, O> = IResult<&'a str, O>;

fn open<'a>(i: &'a str, head: &str) -> PResult<'a, ()> {
    let (i, _) = tag(head).parse(i)?;
    let (i, _) = multispace0(i)?;
    let (i, _) = char('(').parse(i)?;
    let (i, _) = multispace0(i)?;
    Ok((i, ()))
}

fn close(i: &str) -> PResult<'_, ()> {
    let (i, _) = multispace0(i)?;
    let (i, _) = char(')').parse(i)?;
    Ok((i, ()))
}

fn unit_seconds(unit: &str) -> Option<f64> {
    match unit {
        "ms" => Some(0.001),
        "s" | "sec" | "secs" | "second" | "seconds" => Some(1.0),
        "m" | "min" | "mins" | "minute" | "minutes" => Some(60.0),
        "h" | "hr" | "hour" | "hours" => Some(3600.0),
        _ => None,
    }
}

fn periodic(i: &str) -> PResult<'_, TriggerPattern> {
    let (i, _) = open(i, "time.every")?;
    let (i, amount) = recognize((digit1, opt((char('.'), digit1)))).parse(i)?;
    let (i, _) = multispace0(i)?;
    let (i, unit) = opt(alpha1).parse(i)?;
    let (i, _) = close(i)?;

    let scale = match unit {
        Some(u) => unit_seconds(u),
        None => Some(1.0),
    };
    let interval = amount.parse::<f64>().ok().zip(scale).map(|(a, s)| a * s);
    match interval {
        Some(interval) if interval.is_finite() && interval > 0.0 => {
            Ok((i, TriggerPattern::Periodic { interval }))
        }
        _ => Err(nom::Err::Error(nom::error::Error::new(
            i,
            nom::error::ErrorKind::Verify,
        ))),
    }
}

fn is_id_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')
}

fn mention(i: &str) -> PResult<'_, TriggerPattern> {
    let (i, _) = open(i, "mention")?;
    let (i, target) = if let Ok((rest, _)) = char::<&str, nom::error::Error<&str>>('@').parse(i) {
        let (rest, id) = take_while1(is_id_char).parse(rest)?;
        (rest, MentionTarget::Entity(EntityId::new(id)))
    } else {
        let (rest, word) = alpha1(i)?;
        let target = match word {
            "self" => MentionTarget::SelfEntity,
            "others" => MentionTarget::Others,
            "any" => MentionTarget::Any,
            _ => {
                return Err(nom::Err::Error(nom::error::Error::new(
                    i,
                    nom::error::ErrorKind::Alt,
                )))
            }
        };
        (rest, target)
    };
    let (i, _) = close(i)?;
    Ok((i, TriggerPattern::Mention { target }))
}

fn event(i: &str) -> PResult<'_, TriggerPattern> {
    let (i, _) = open(i, "event")?;
    let (i, name) = opt(take_while1(is_id_char)).parse(i)?;
    let (i, star) = opt(char('*')).parse(i)?;
    let (i, _) = close(i)?;

    let name = name.unwrap_or("").to_string();
    let match_kind = match (name.is_empty(), star.is_some()) {
        (true, true) => EventMatch::Any,
        (false, true) => EventMatch::Prefix,
        (false, false) => EventMatch::Exact,
        (true, false) => {
            return Err(nom::Err::Error(nom::error::Error::new(
                i,
                nom::error::ErrorKind::Verify,
            )))
        }
    };
    Ok((i, TriggerPattern::Event { match_kind, name }))
}
