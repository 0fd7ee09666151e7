//! Keyset pagination cursors.
//!
//! A cursor names the last row of the previous page by its ordering key
//! `(date, id)`. The encoded form is opaque to callers; a token that does
//! not decode is a validation error, never undefined behaviour.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

use crate::{Error, database_id::TransactionId};

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// The ordering key of the last row of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// The date of the row.
    pub date: Date,
    /// The row id, breaking ties between rows sharing a date.
    pub id: TransactionId,
}

impl Cursor {
    /// Encode the cursor as an opaque URL-safe token.
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}|{}", self.date, self.id))
    }

    /// Decode a token produced by [Cursor::encode].
    ///
    /// # Errors
    /// Returns an [Error::InvalidCursor] if the token is not valid base64
    /// or does not contain a date and an id.
    pub fn decode(token: &str) -> Result<Self, Error> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| Error::InvalidCursor)?;
        let text = String::from_utf8(bytes).map_err(|_| Error::InvalidCursor)?;

        let (date_text, id_text) = text.split_once('|').ok_or(Error::InvalidCursor)?;

        let date = Date::parse(date_text, DATE_FORMAT).map_err(|_| Error::InvalidCursor)?;
        let id = id_text.parse().map_err(|_| Error::InvalidCursor)?;

        Ok(Cursor { date, id })
    }
}

#[cfg(test)]
mod cursor_tests {
    use time::macros::date;

    use crate::Error;

    use super::Cursor;

    #[test]
    fn encode_decode_round_trips() {
        let cursor = Cursor {
            date: date!(2026 - 02 - 14),
            id: 42,
        };

        let decoded = Cursor::decode(&cursor.encode()).expect("Could not decode cursor");

        assert_eq!(cursor, decoded);
    }

    #[test]
    fn decode_rejects_garbage() {
        for token in ["", "!!!", "bm90LWEtY3Vyc29y", "MjAyNi0wMi0xNA"] {
            let result = Cursor::decode(token);

            assert_eq!(result, Err(Error::InvalidCursor), "decoding {token:?}");
        }
    }

    #[test]
    fn decode_rejects_invalid_date() {
        let cursor = Cursor {
            date: date!(2026 - 02 - 14),
            id: 7,
        };
        let token = cursor.encode().replace("M", "X");

        let result = Cursor::decode(&token);

        assert_eq!(result, Err(Error::InvalidCursor));
    }
}
