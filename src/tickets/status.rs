//! Status, priority and category vocabularies for the ticket state machine.
//!
//! The stored columns are plain text; these enums are the single place that
//! decides which values are members of each set. Transitions are deliberately
//! unordered — any enumerated status may follow any other — so validation is
//! membership only.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Aberto,
    EmAndamento,
    EmAtendimento,
    Pendente,
    AguardandoCliente,
    EmFaseDeTestes,
    Homologacao,
    Resolvido,
    Fechado,
    Encerrado,
}

impl TicketStatus {
    /// Closed statuses; tickets in these states are done work.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Fechado | Self::Encerrado)
    }
}

impl Default for TicketStatus {
    fn default() -> Self {
        Self::Aberto
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aberto => write!(f, "aberto"),
            Self::EmAndamento => write!(f, "em_andamento"),
            Self::EmAtendimento => write!(f, "em_atendimento"),
            Self::Pendente => write!(f, "pendente"),
            Self::AguardandoCliente => write!(f, "aguardando_cliente"),
            Self::EmFaseDeTestes => write!(f, "em_fase_de_testes"),
            Self::Homologacao => write!(f, "homologacao"),
            Self::Resolvido => write!(f, "resolvido"),
            Self::Fechado => write!(f, "fechado"),
            Self::Encerrado => write!(f, "encerrado"),
        }
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aberto" => Ok(Self::Aberto),
            "em_andamento" => Ok(Self::EmAndamento),
            "em_atendimento" => Ok(Self::EmAtendimento),
            "pendente" => Ok(Self::Pendente),
            "aguardando_cliente" => Ok(Self::AguardandoCliente),
            "em_fase_de_testes" => Ok(Self::EmFaseDeTestes),
            "homologacao" => Ok(Self::Homologacao),
            "resolvido" => Ok(Self::Resolvido),
            "fechado" => Ok(Self::Fechado),
            "encerrado" => Ok(Self::Encerrado),
            _ => Err(format!("Unknown ticket status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Baixa,
    Media,
    Alta,
    Critica,
}

impl Default for TicketPriority {
    fn default() -> Self {
        Self::Media
    }
}

impl std::fmt::Display for TicketPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Baixa => write!(f, "baixa"),
            Self::Media => write!(f, "media"),
            Self::Alta => write!(f, "alta"),
            Self::Critica => write!(f, "critica"),
        }
    }
}

impl std::str::FromStr for TicketPriority {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "baixa" => Ok(Self::Baixa),
            "media" => Ok(Self::Media),
            "alta" => Ok(Self::Alta),
            "critica" => Ok(Self::Critica),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketCategory {
    Tecnico,
    Suporte,
    Financeiro,
    Outros,
}

impl Default for TicketCategory {
    fn default() -> Self {
        Self::Outros
    }
}

impl std::fmt::Display for TicketCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tecnico => write!(f, "tecnico"),
            Self::Suporte => write!(f, "suporte"),
            Self::Financeiro => write!(f, "financeiro"),
            Self::Outros => write!(f, "outros"),
        }
    }
}

impl std::str::FromStr for TicketCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tecnico" => Ok(Self::Tecnico),
            "suporte" => Ok(Self::Suporte),
            "financeiro" => Ok(Self::Financeiro),
            "outros" => Ok(Self::Outros),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

/// Financial tickets carry their own, smaller status set. `paid` is normally
/// written by the ERP reconciliation path but a manual override is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancialStatus {
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

impl Default for FinancialStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl std::fmt::Display for FinancialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Paid => write!(f, "paid"),
            Self::Overdue => write!(f, "overdue"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for FinancialStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "overdue" => Ok(Self::Overdue),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown financial status: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn every_status_round_trips() {
        for s in [
            TicketStatus::Aberto,
            TicketStatus::EmAndamento,
            TicketStatus::EmAtendimento,
            TicketStatus::Pendente,
            TicketStatus::AguardandoCliente,
            TicketStatus::EmFaseDeTestes,
            TicketStatus::Homologacao,
            TicketStatus::Resolvido,
            TicketStatus::Fechado,
            TicketStatus::Encerrado,
        ] {
            assert_eq!(TicketStatus::from_str(&s.to_string()), Ok(s));
        }
    }

    #[test]
    fn membership_is_the_only_rule() {
        // Any direction of movement is allowed, so parsing is the whole
        // validation; order is not enforced.
        assert!(TicketStatus::from_str("fechado").is_ok());
        assert!(TicketStatus::from_str("reaberto").is_err());
        assert!(TicketStatus::from_str("open").is_err());
    }

    #[test]
    fn terminal_statuses() {
        assert!(TicketStatus::Fechado.is_terminal());
        assert!(TicketStatus::Encerrado.is_terminal());
        assert!(!TicketStatus::Resolvido.is_terminal());
        assert!(!TicketStatus::Aberto.is_terminal());
    }

    #[test]
    fn new_tickets_open_with_aberto_and_media() {
        assert_eq!(TicketStatus::default(), TicketStatus::Aberto);
        assert_eq!(TicketPriority::default(), TicketPriority::Media);
    }

    #[test]
    fn financial_statuses_parse() {
        assert_eq!(FinancialStatus::from_str("paid"), Ok(FinancialStatus::Paid));
        assert!(FinancialStatus::from_str("refunded").is_err());
    }
}
