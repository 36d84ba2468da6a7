use serde::Serialize;

#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Clanmate,
    Admin,
    Creator,
    Streamer,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Badge {
    pub label: &'static str,
    pub class: &'static str,
}

impl Role {
    pub fn parse(s: &str) -> Role {
        match s {
            "clanmate" => Role::Clanmate,
            "admin" => Role::Admin,
            "creator" => Role::Creator,
            "streamer" => Role::Streamer,
            _ => Role::User,
        }
    }

    /// Roles allowed to pin comments and open or close replies and dislikes.
    pub fn can_moderate(self) -> bool {
        matches!(self, Role::Admin | Role::Creator)
    }

    /// The label shown next to the author's name. Plain users get none.
    pub fn badge(self) -> Option<Badge> {
        let (label, class) = match self {
            Role::Creator => ("Creator", "bg-purple-700"),
            Role::Admin => ("Admin", "bg-red-700"),
            Role::Clanmate => ("Clanmate", "bg-blue-700"),
            Role::Streamer => ("Streamer", "bg-pink-700"),
            Role::User => return None,
        };
        Some(Badge { label, class })
    }
}

// Unknown or missing roles degrade to a plain user instead of failing the
// whole row.
impl<'de> serde::Deserialize<'de> for Role {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Role::parse).unwrap_or_default())
    }
}
