use crate::domain::operation::Operation;
use crate::error::{PaymentError, Result};
use std::io::Read;

/// Reads lifecycle operations from a CSV source.
///
/// Wraps `csv::Reader` and provides an iterator over `Result<Operation>`.
/// Whitespace is trimmed and record lengths are flexible, so op-specific
/// trailing columns may be omitted entirely.
pub struct OperationReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OperationReader<R> {
    /// Creates a new `OperationReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Returns an iterator that lazily reads and deserializes operations,
    /// allowing large streams to be processed without loading them whole.
    pub fn operations(self) -> impl Iterator<Item = Result<Operation>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::operation::OperationKind;

    #[test]
    fn test_reader_valid_stream() {
        let data = "op, id, payer, base, extra, sponsor, subsidy_limit, rate, amount, mode\n\
                    make, 1, 2, 1000, 400, 3, 800, 200, , \n\
                    confirm, 1, , , , , , , 500, ";
        let reader = OperationReader::new(data.as_bytes());
        let results: Vec<Result<Operation>> = reader.operations().collect();

        assert_eq!(results.len(), 2);
        let make = results[0].as_ref().unwrap();
        assert_eq!(make.op, OperationKind::Make);
        assert_eq!(make.base, Some(1000));
        let confirm = results[1].as_ref().unwrap();
        assert_eq!(confirm.op, OperationKind::Confirm);
        assert_eq!(confirm.amount, Some(500));
    }

    #[test]
    fn test_reader_malformed_line() {
        let data = "op, id, payer, base, extra, sponsor, subsidy_limit, rate, amount, mode\n\
                    teleport, 1, 2, 1000, , , , , , ";
        let reader = OperationReader::new(data.as_bytes());
        let results: Vec<Result<Operation>> = reader.operations().collect();

        assert!(results[0].is_err());
    }
}
