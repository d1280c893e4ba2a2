use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::{Amount, Request, User};

/// Errors that can occur when parsing csv rows
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized operation '{op}'")]
    UnrecognizedOp { line: usize, op: String },

    #[error("line {line}: {op} missing {field}")]
    MissingField {
        line: usize,
        op: &'static str,
        field: &'static str,
    },
}

#[derive(Debug, Deserialize)]
struct InputRow {
    op: String,
    username: String,
    email: Option<String>,
    sponsor: Option<String>,
    amount: Option<f64>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutputRow {
    username: String,
    level: u32,
    position: Option<u8>,
    total_earnings: Amount,
    direct_earnings: Amount,
    indirect_earnings: Amount,
    active: bool,
}

/// Read engine requests from a csv file
pub fn read_requests(path: impl AsRef<Path>) -> impl Iterator<Item = Result<Request, CsvError>> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .expect("failed to open csv file");

    reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            match row.op.as_str() {
                "register" => {
                    let email = row.email.ok_or(CsvError::MissingField {
                        line,
                        op: "register",
                        field: "email",
                    })?;
                    Ok(Request::Register {
                        username: row.username,
                        email,
                        sponsor: row.sponsor,
                    })
                }
                "purchase" => {
                    let amount = row.amount.ok_or(CsvError::MissingField {
                        line,
                        op: "purchase",
                        field: "amount",
                    })?;
                    Ok(Request::Purchase {
                        username: row.username,
                        amount: Amount::from_float(amount),
                        description: row.description,
                    })
                }
                other => Err(CsvError::UnrecognizedOp {
                    line,
                    op: other.to_string(),
                }),
            }
        })
}

/// write user earning summaries to stdout in csv format
pub fn write_users(users: impl IntoIterator<Item = User>) {
    let stdout = io::stdout();
    let mut writer = csv::Writer::from_writer(stdout.lock());

    for user in users {
        let row = OutputRow {
            username: user.username,
            level: user.level,
            position: user.position,
            total_earnings: user.total_earnings,
            direct_earnings: user.total_direct_earnings,
            indirect_earnings: user.total_indirect_earnings,
            active: user.is_active,
        };
        writer.serialize(&row).expect("failed to write csv row");
    }

    writer.flush().expect("failed to flush csv writer");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const HEADER: &str = "op,username,email,sponsor,amount,description\n";

    #[test]
    fn read_register() {
        let file = write_csv(&format!(
            "{HEADER}register,grace,grace@example.com,,,\n"
        ));
        let results: Vec<_> = read_requests(file.path()).collect();
        assert_eq!(results.len(), 1);

        let request = results.into_iter().next().unwrap().unwrap();
        match request {
            Request::Register {
                username,
                email,
                sponsor,
            } => {
                assert_eq!(username, "grace");
                assert_eq!(email, "grace@example.com");
                assert_eq!(sponsor, None);
            }
            _ => panic!("expected register"),
        }
    }

    #[test]
    fn read_register_with_sponsor() {
        let file = write_csv(&format!(
            "{HEADER}register,adam,adam@example.com,grace,,\n"
        ));
        let request = read_requests(file.path()).next().unwrap().unwrap();
        match request {
            Request::Register { sponsor, .. } => assert_eq!(sponsor.as_deref(), Some("grace")),
            _ => panic!("expected register"),
        }
    }

    #[test]
    fn read_purchase() {
        let file = write_csv(&format!("{HEADER}purchase,piper,,,5000,laptop\n"));
        let request = read_requests(file.path()).next().unwrap().unwrap();
        match request {
            Request::Purchase {
                username,
                amount,
                description,
            } => {
                assert_eq!(username, "piper");
                assert_eq!(amount, Amount::from_units(5000));
                assert_eq!(description.as_deref(), Some("laptop"));
            }
            _ => panic!("expected purchase"),
        }
    }

    #[test]
    fn read_with_whitespace() {
        let file = write_csv(
            "op, username, email, sponsor, amount, description\npurchase, piper, , , 5000, \n",
        );
        let results: Vec<_> = read_requests(file.path()).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }

    #[test]
    fn read_returns_error_for_unknown_op() {
        let file = write_csv(&format!("{HEADER}refund,piper,,,100,\n"));
        let results: Vec<_> = read_requests(file.path()).collect();
        assert_eq!(results.len(), 1);
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(err, CsvError::UnrecognizedOp { line: 2, .. }));
    }

    #[test]
    fn read_returns_error_for_purchase_without_amount() {
        let file = write_csv(&format!("{HEADER}purchase,piper,,,,\n"));
        let results: Vec<_> = read_requests(file.path()).collect();
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(
            err,
            CsvError::MissingField {
                line: 2,
                field: "amount",
                ..
            }
        ));
    }

    #[test]
    fn read_returns_error_for_register_without_email() {
        let file = write_csv(&format!("{HEADER}register,grace,,,,\n"));
        let results: Vec<_> = read_requests(file.path()).collect();
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(
            err,
            CsvError::MissingField {
                line: 2,
                field: "email",
                ..
            }
        ));
    }
}
