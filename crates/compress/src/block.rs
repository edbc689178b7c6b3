//! Token stream encoding with a given pair of code tables.

use thiserror::Error;

use crate::bits::BitWriter;
use crate::header::HuffmanTables;
use crate::matcher::Token;
use crate::tables::{distance_code, length_code};

/// Errors raised while encoding tokens.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
pub enum EncodeError {
    /// The literal/length table has no code for a symbol the data needs.
    #[error("literal/length symbol {symbol} has no code")]
    MissingLitLenCode {
        /// Offending literal/length symbol.
        symbol: usize,
    },
    /// The distance table has no code for a symbol the data needs.
    #[error("distance symbol {symbol} has no code")]
    MissingDistanceCode {
        /// Offending distance symbol.
        symbol: usize,
    },
}

/// Appends the codes for `tokens` to `writer`.
///
/// No block header or end-of-block code is written.
pub fn encode_tokens(
    writer: &mut BitWriter,
    tokens: &[Token],
    tables: &HuffmanTables,
) -> Result<(), EncodeError> {
    let lit_len = tables.lit_len();
    let dist = tables.dist();
    for token in tokens {
        match *token {
            Token::Literal(byte) => {
                let symbol = usize::from(byte);
                let code = lit_len[symbol];
                if code.is_empty() {
                    return Err(EncodeError::MissingLitLenCode { symbol });
                }
                writer.write_code(code);
            }
            Token::Match { length, distance } => {
                let length = length_code(usize::from(length));
                let code = lit_len[length.symbol];
                if code.is_empty() {
                    return Err(EncodeError::MissingLitLenCode {
                        symbol: length.symbol,
                    });
                }
                writer.write_code(code);
                writer.write_bits(u32::from(length.extra_value), u32::from(length.extra_bits));

                let distance = distance_code(usize::from(distance));
                let code = dist[distance.symbol];
                if code.is_empty() {
                    return Err(EncodeError::MissingDistanceCode {
                        symbol: distance.symbol,
                    });
                }
                writer.write_code(code);
                writer.write_bits(
                    u32::from(distance.extra_value),
                    u32::from(distance.extra_bits),
                );
            }
        }
    }
    Ok(())
}

/// Appends the end-of-block code of `tables`.
pub fn write_end_of_block(writer: &mut BitWriter, tables: &HuffmanTables) {
    writer.write_code(tables.end_of_block());
}
