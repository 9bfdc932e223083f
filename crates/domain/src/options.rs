use std::collections::BTreeSet;

use crate::PipelineError;

/// A user-facing generation option with a fixed token on the remote service.
///
/// Implementations map every variant through an exhaustive `match`, so the
/// table is total by construction. `verify_option_tables` checks at startup
/// that it is also unambiguous in both directions.
pub trait RemoteOption: Sized + Copy + Ord + 'static {
    /// Label used in error messages ("difficulty", "mode", ...).
    const KIND: &'static str;
    const ALL: &'static [Self];

    fn public_name(self) -> &'static str;
    fn remote_token(self) -> &'static str;

    /// Accepts the public name or the remote token, ignoring ASCII case.
    fn parse_public(input: &str) -> Result<Self, PipelineError> {
        let needle = input.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|option| {
                option.public_name().eq_ignore_ascii_case(needle)
                    || option.remote_token().eq_ignore_ascii_case(needle)
            })
            .ok_or_else(|| {
                let expected: Vec<&str> = Self::ALL.iter().map(|o| o.public_name()).collect();
                PipelineError::configuration(format!(
                    "unknown {} '{}', expected one of: {}",
                    Self::KIND,
                    needle,
                    expected.join(", ")
                ))
            })
    }

    fn from_remote(token: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|option| option.remote_token() == token)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Difficulty {
    Normal,
    Hard,
    Expert,
    ExpertPlus,
}

impl RemoteOption for Difficulty {
    const KIND: &'static str = "difficulty";
    const ALL: &'static [Self] = &[
        Difficulty::Normal,
        Difficulty::Hard,
        Difficulty::Expert,
        Difficulty::ExpertPlus,
    ];

    fn public_name(self) -> &'static str {
        match self {
            Difficulty::Normal => "normal",
            Difficulty::Hard => "hard",
            Difficulty::Expert => "expert",
            Difficulty::ExpertPlus => "expert-plus",
        }
    }

    fn remote_token(self) -> &'static str {
        match self {
            Difficulty::Normal => "Normal",
            Difficulty::Hard => "Hard",
            Difficulty::Expert => "Expert",
            Difficulty::ExpertPlus => "ExpertPlus",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Mode {
    Standard,
    NinetyDegree,
    NoArrows,
    OneSaber,
}

impl RemoteOption for Mode {
    const KIND: &'static str = "mode";
    const ALL: &'static [Self] = &[
        Mode::Standard,
        Mode::NinetyDegree,
        Mode::NoArrows,
        Mode::OneSaber,
    ];

    fn public_name(self) -> &'static str {
        match self {
            Mode::Standard => "standard",
            Mode::NinetyDegree => "90-degree",
            Mode::NoArrows => "no-arrows",
            Mode::OneSaber => "one-saber",
        }
    }

    fn remote_token(self) -> &'static str {
        match self {
            Mode::Standard => "Standard",
            Mode::NinetyDegree => "90Degree",
            Mode::NoArrows => "NoArrows",
            Mode::OneSaber => "OneSaber",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Event {
    DotBlocks,
    Obstacles,
    Bombs,
}

impl RemoteOption for Event {
    const KIND: &'static str = "event";
    const ALL: &'static [Self] = &[Event::DotBlocks, Event::Obstacles, Event::Bombs];

    fn public_name(self) -> &'static str {
        match self {
            Event::DotBlocks => "dot-blocks",
            Event::Obstacles => "obstacles",
            Event::Bombs => "bombs",
        }
    }

    fn remote_token(self) -> &'static str {
        match self {
            Event::DotBlocks => "DotBlocks",
            Event::Obstacles => "Obstacles",
            Event::Bombs => "Bombs",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Environment {
    TheFirst,
    Origins,
    Triangle,
    Nice,
    BigMirror,
    ImagineDragons,
    Kda,
    Monstercat,
    CrabRave,
    Panic,
    RocketLeague,
    GreenDay,
    GreenDayGrenade,
    Timbaland,
    FitBeat,
    LinkinPark,
}

impl RemoteOption for Environment {
    const KIND: &'static str = "environment";
    const ALL: &'static [Self] = &[
        Environment::TheFirst,
        Environment::Origins,
        Environment::Triangle,
        Environment::Nice,
        Environment::BigMirror,
        Environment::ImagineDragons,
        Environment::Kda,
        Environment::Monstercat,
        Environment::CrabRave,
        Environment::Panic,
        Environment::RocketLeague,
        Environment::GreenDay,
        Environment::GreenDayGrenade,
        Environment::Timbaland,
        Environment::FitBeat,
        Environment::LinkinPark,
    ];

    fn public_name(self) -> &'static str {
        match self {
            Environment::TheFirst => "the-first",
            Environment::Origins => "origins",
            Environment::Triangle => "triangle",
            Environment::Nice => "nice",
            Environment::BigMirror => "big-mirror",
            Environment::ImagineDragons => "imagine-dragons",
            Environment::Kda => "kda",
            Environment::Monstercat => "monstercat",
            Environment::CrabRave => "crab-rave",
            Environment::Panic => "panic",
            Environment::RocketLeague => "rocket-league",
            Environment::GreenDay => "green-day",
            Environment::GreenDayGrenade => "green-day-grenade",
            Environment::Timbaland => "timbaland",
            Environment::FitBeat => "fitbeat",
            Environment::LinkinPark => "linkin-park",
        }
    }

    fn remote_token(self) -> &'static str {
        match self {
            Environment::TheFirst => "DefaultEnvironment",
            Environment::Origins => "Origins",
            Environment::Triangle => "TriangleEnvironment",
            Environment::Nice => "NiceEnvironment",
            Environment::BigMirror => "BigMirrorEnvironment",
            Environment::ImagineDragons => "DragonsEnvironment",
            Environment::Kda => "KDAEnvironment",
            Environment::Monstercat => "MonstercatEnvironment",
            Environment::CrabRave => "CrabRaveEnvironment",
            Environment::Panic => "PanicEnvironment",
            Environment::RocketLeague => "RocketEnvironment",
            Environment::GreenDay => "GreenDayEnvironment",
            Environment::GreenDayGrenade => "GreenDayGrenadeEnvironment",
            Environment::Timbaland => "TimbalandEnvironment",
            Environment::FitBeat => "FitBeatEnvironment",
            Environment::LinkinPark => "LinkinParkEnvironment",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModelTag {
    V1,
    V2,
    V2Flow,
}

impl RemoteOption for ModelTag {
    const KIND: &'static str = "model tag";
    const ALL: &'static [Self] = &[ModelTag::V1, ModelTag::V2, ModelTag::V2Flow];

    fn public_name(self) -> &'static str {
        match self {
            ModelTag::V1 => "one",
            ModelTag::V2 => "two",
            ModelTag::V2Flow => "flow",
        }
    }

    fn remote_token(self) -> &'static str {
        match self {
            ModelTag::V1 => "v1",
            ModelTag::V2 => "v2",
            ModelTag::V2Flow => "v2-flow",
        }
    }
}

/// Parses a comma-separated list into a set. Blank entries are ignored, so an
/// empty string yields an empty set.
pub fn parse_option_list<T: RemoteOption>(input: &str) -> Result<BTreeSet<T>, PipelineError> {
    input
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(T::parse_public)
        .collect()
}

/// Joins the remote tokens of a set in its sorted order.
pub fn join_tokens<T: RemoteOption>(options: &BTreeSet<T>) -> String {
    options
        .iter()
        .map(|option| option.remote_token())
        .collect::<Vec<_>>()
        .join(",")
}

fn verify_table<T: RemoteOption>() -> Result<(), PipelineError> {
    let mut names = BTreeSet::new();
    let mut tokens = BTreeSet::new();
    for &option in T::ALL {
        let name = option.public_name();
        let token = option.remote_token();
        if name.is_empty() || token.is_empty() {
            return Err(PipelineError::configuration(format!(
                "{} option has an empty name or token",
                T::KIND
            )));
        }
        if !names.insert(name.to_ascii_lowercase()) || !tokens.insert(token) {
            return Err(PipelineError::configuration(format!(
                "duplicate {} entry '{}' -> '{}'",
                T::KIND,
                name,
                token
            )));
        }
        let by_name = T::parse_public(name)?;
        let by_token = T::parse_public(token)?;
        if by_name != option || by_token != option || T::from_remote(token) != Some(option) {
            return Err(PipelineError::configuration(format!(
                "{} entry '{}' does not round-trip through '{}'",
                T::KIND,
                name,
                token
            )));
        }
    }
    Ok(())
}

/// Checks every option table for completeness and unambiguous lookups.
pub fn verify_option_tables() -> Result<(), PipelineError> {
    verify_table::<Difficulty>()?;
    verify_table::<Mode>()?;
    verify_table::<Event>()?;
    verify_table::<Environment>()?;
    verify_table::<ModelTag>()?;
    Ok(())
}
