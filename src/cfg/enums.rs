// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// Boolean enumeration with string serialization support
///
/// Accepts "Yes"/"No", "true"/"false" and "1"/"0".
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum YesNo {
    #[serde(
        rename = "Yes",
        alias = "yes",
        alias = "YES",
        alias = "true",
        alias = "True",
        alias = "1"
    )]
    Yes,
    #[serde(
        rename = "No",
        alias = "no",
        alias = "NO",
        alias = "false",
        alias = "False",
        alias = "0"
    )]
    No,
}
impl fmt::Display for YesNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            YesNo::Yes => "Yes",
            YesNo::No => "No",
        })
    }
}
impl From<bool> for YesNo {
    fn from(b: bool) -> Self {
        if b { YesNo::Yes } else { YesNo::No }
    }
}
impl YesNo {
    pub fn as_bool(self) -> bool {
        matches!(self, YesNo::Yes)
    }
}

/// ESES protocol revision spoken by the enclosure firmware.
///
/// CDES-1 carries 5-character firmware revisions, CDES-2 carries 16.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EsesVersion {
    #[default]
    #[serde(rename = "CDES-1", alias = "cdes-1", alias = "1.0", alias = "ESES-1.0")]
    Cdes1,
    #[serde(rename = "CDES-2", alias = "cdes-2", alias = "2.0", alias = "ESES-2.0")]
    Cdes2,
}
impl fmt::Display for EsesVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EsesVersion::Cdes1 => "CDES-1",
            EsesVersion::Cdes2 => "CDES-2",
        })
    }
}
impl EsesVersion {
    /// Width of the component revision field in version descriptors.
    #[inline]
    pub fn revision_len(self) -> usize {
        match self {
            EsesVersion::Cdes1 => 5,
            EsesVersion::Cdes2 => 16,
        }
    }
}

/// Hardware platforms with a built-in wiring table.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformKind {
    #[serde(rename = "Viper", alias = "viper", alias = "VIPER")]
    Viper,
    #[serde(rename = "Pinecone", alias = "pinecone", alias = "PINECONE")]
    Pinecone,
    #[serde(rename = "Magnum", alias = "magnum", alias = "MAGNUM")]
    Magnum,
}
impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlatformKind::Viper => "Viper",
            PlatformKind::Pinecone => "Pinecone",
            PlatformKind::Magnum => "Magnum",
        })
    }
}

/// LCC side the engine is attached through.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SideId {
    #[serde(rename = "A", alias = "a", alias = "0")]
    A,
    #[serde(rename = "B", alias = "b", alias = "1")]
    B,
}
impl fmt::Display for SideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SideId::A => "A",
            SideId::B => "B",
        })
    }
}
impl SideId {
    #[inline]
    pub fn index(self) -> u8 {
        match self {
            SideId::A => 0,
            SideId::B => 1,
        }
    }

    #[inline]
    pub fn peer(self) -> SideId {
        match self {
            SideId::A => SideId::B,
            SideId::B => SideId::A,
        }
    }
}
