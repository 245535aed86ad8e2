//! Library lending domain: books, clients, branches, and loans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use graphify_core::{Describable, GeoPoint, TypeDescriptor};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Book {
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub pages: Option<u32>,
    pub genres: Vec<String>,
}

impl Describable for Book {
    fn describe(&self) -> TypeDescriptor {
        TypeDescriptor::new("Book")
            .field::<String>("title")
            .field::<String>("author")
            .field::<String>("isbn")
            .field::<Option<u32>>("pages")
            .field::<Vec<String>>("genres")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Client {
    pub name: String,
    pub email: Option<String>,
    pub member_since: DateTime<Utc>,
}

impl Describable for Client {
    fn describe(&self) -> TypeDescriptor {
        TypeDescriptor::new("Client")
            .field::<String>("name")
            .field::<Option<String>>("email")
            .field::<DateTime<Utc>>("member_since")
    }
}

/// A library branch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Library {
    pub name: String,
    pub location: GeoPoint,
}

impl Describable for Library {
    // `location` is indexed by a migration hook, not a hint.
    fn describe(&self) -> TypeDescriptor {
        TypeDescriptor::new("Library")
            .field::<String>("name")
            .field::<GeoPoint>("location")
    }
}

/// A loan: `Client -> Book`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Borrow {
    pub since: DateTime<Utc>,
    pub due: Option<DateTime<Utc>>,
}

impl Describable for Borrow {
    fn describe(&self) -> TypeDescriptor {
        TypeDescriptor::new("Borrow")
            .field::<DateTime<Utc>>("since")
            .field::<Option<DateTime<Utc>>>("due")
    }
}
