/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at http://mozilla.org/MPL/2.0/. */

use std::fmt;

use crate::Error;

/// The Exchange Server version identifiers allowed in `RequestServerVersion`
/// headers.
///
/// Versions are ordered by release, so comparison operators can be used to
/// gate features on a minimum version.
///
/// See <https://learn.microsoft.com/en-us/exchange/client-developer/web-service-reference/requestserverversion#version-attribute-values>
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExchangeServerVersion {
    Exchange2007,
    Exchange2007_SP1,
    Exchange2010,
    Exchange2010_SP1,
    Exchange2010_SP2,
    Exchange2013,
    Exchange2013_SP1,
}

impl ExchangeServerVersion {
    /// The version identifier as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeServerVersion::Exchange2007 => "Exchange2007",
            ExchangeServerVersion::Exchange2007_SP1 => "Exchange2007_SP1",
            ExchangeServerVersion::Exchange2010 => "Exchange2010",
            ExchangeServerVersion::Exchange2010_SP1 => "Exchange2010_SP1",
            ExchangeServerVersion::Exchange2010_SP2 => "Exchange2010_SP2",
            ExchangeServerVersion::Exchange2013 => "Exchange2013",
            ExchangeServerVersion::Exchange2013_SP1 => "Exchange2013_SP1",
        }
    }
}

impl fmt::Display for ExchangeServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the provided string into a known version identifier.
impl TryFrom<&str> for ExchangeServerVersion {
    /// If the provided string could not be turned into a known version
    /// identifier, [`Error::UnknownServerVersion`] is returned.
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "Exchange2007" => Ok(ExchangeServerVersion::Exchange2007),
            "Exchange2007_SP1" => Ok(ExchangeServerVersion::Exchange2007_SP1),
            "Exchange2010" => Ok(ExchangeServerVersion::Exchange2010),
            "Exchange2010_SP1" => Ok(ExchangeServerVersion::Exchange2010_SP1),
            "Exchange2010_SP2" => Ok(ExchangeServerVersion::Exchange2010_SP2),
            "Exchange2013" => Ok(ExchangeServerVersion::Exchange2013),
            "Exchange2013_SP1" => Ok(ExchangeServerVersion::Exchange2013_SP1),

            _ => Err(Error::UnknownServerVersion(value.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_are_ordered_by_release() {
        assert!(ExchangeServerVersion::Exchange2007 < ExchangeServerVersion::Exchange2007_SP1);
        assert!(ExchangeServerVersion::Exchange2010_SP2 < ExchangeServerVersion::Exchange2013);
    }

    #[test]
    fn parse_round_trips() {
        let version = ExchangeServerVersion::try_from("Exchange2010_SP1").unwrap();
        assert_eq!(version, ExchangeServerVersion::Exchange2010_SP1);
        assert_eq!(version.as_str(), "Exchange2010_SP1");
    }

    #[test]
    fn unknown_version_is_rejected() {
        assert!(matches!(
            ExchangeServerVersion::try_from("Exchange2003"),
            Err(Error::UnknownServerVersion(_))
        ));
    }
}
